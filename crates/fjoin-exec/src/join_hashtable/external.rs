//! External hash join: partitioned builds processed in rounds.
//!
//! When the build side does not fit in memory every worker-local table is
//! swizzled and radix partitioned on the top bits of the stored key hashes.
//! The global table then works through the partitions in rounds: each round
//! unswizzles the window `[partitions_start, partitions_end)` that fits in
//! `tuples_per_round` rows, finalizes it and is probed. Probe rows that
//! belong to later partitions are spilled into a probe-side table that is
//! partitioned the same way and replayed round by round.

use std::ops::Range;

use fjoin_error::{JoinError, Result};
use fjoin_rowstore::layout::POINTER_WIDTH;
use fjoin_rowstore::swizzle::{self, SwizzledRows, partition_of};
use fjoin_rowstore::RowLayout;
use fjoin_types::{DataChunk, SelectionVector};

use super::{JoinHashTable, PartitionSet};
use crate::instrumentation::{
    record_external_round, record_partition_task, record_probe_rows, record_repartition,
    record_swizzle_in, record_swizzle_out,
};
use crate::scan::ScanStructure;
use crate::scan_state::JoinHTScanState;
use crate::scheduler::TaskScheduler;

/// Result of [`JoinHashTable::probe_and_build`]: the scan over the rows that
/// belong to the current round, and those rows themselves.
#[derive(Debug)]
pub struct ProbeAndBuild<'a> {
    pub scan: ScanStructure<'a>,
    pub keys: DataChunk,
    pub payload: DataChunk,
}

/// Split every partition of a `radix_bits` partitioning in two.
fn refine_partitions(
    layout: &RowLayout,
    partitions: Vec<SwizzledRows>,
    radix_bits: u32,
) -> Result<Vec<SwizzledRows>> {
    let mut out = Vec::with_capacity(partitions.len() * 2);
    for (idx, partition) in partitions.into_iter().enumerate() {
        out.extend(swizzle::partition_window(
            layout,
            partition,
            radix_bits + 1,
            idx * 2,
            2,
        )?);
    }
    record_repartition();
    Ok(out)
}

impl JoinHashTable {
    /// Whether the combined `tables` would exceed `max_ht_size` bytes once finalized.
    #[must_use]
    pub fn requires_external(tables: &[Self], max_ht_size: usize) -> bool {
        let Some(first) = tables.first() else {
            return false;
        };
        let (count, size) = tables.iter().fold((0, 0), |(count, size), table| {
            (
                count + table.count() + table.swizzled_count(),
                size + table.size_in_bytes() + table.swizzled_size(),
            )
        });
        size + first.config.directory_capacity(count) * POINTER_WIDTH > max_ht_size
    }

    #[must_use]
    pub const fn is_external(&self) -> bool {
        self.external
    }

    #[must_use]
    pub const fn radix_bits(&self) -> u32 {
        self.radix_bits
    }

    #[must_use]
    pub const fn tuples_per_round(&self) -> usize {
        self.tuples_per_round
    }

    /// Partition window of the current round.
    #[must_use]
    pub const fn partition_window(&self) -> Range<usize> {
        self.partitions_start..self.partitions_end
    }

    /// Number of partitions in the partition set.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partition_lock.lock().partitions.len()
    }

    /// Rows still waiting in partitions that no round has taken yet.
    #[must_use]
    pub fn pending_partitioned_rows(&self) -> usize {
        self.partition_lock
            .lock()
            .partitions
            .iter()
            .map(SwizzledRows::count)
            .sum()
    }

    fn empty_partitions(&self) -> Vec<SwizzledRows> {
        (0..1_usize << self.radix_bits)
            .map(|_| SwizzledRows::new(self.layout.entry_size(), self.config.rows_per_block))
            .collect()
    }

    /// Move every resident row into the swizzled collection and drop the heap.
    pub fn swizzle_blocks(&mut self) -> Result<()> {
        if self.finalized {
            return Err(JoinError::contract("cannot swizzle a finalized hash table"));
        }
        if self.block_collection.is_empty() {
            return Ok(());
        }
        let rows = self.block_collection.take();
        let moved = rows.count();
        let swizzled = swizzle::swizzle(&self.layout, rows, &self.string_heap)?;
        self.string_heap.clear();
        self.swizzled.merge(swizzled)?;
        record_swizzle_out(moved);
        Ok(())
    }

    /// Move every swizzled row back into resident storage.
    pub fn unswizzle_blocks(&mut self) -> Result<()> {
        if self.finalized {
            return Err(JoinError::contract("cannot unswizzle into a finalized hash table"));
        }
        let swizzled = self.swizzled.take();
        let moved = swizzled.count();
        swizzle::unswizzle(
            &self.layout,
            swizzled,
            &mut self.block_collection,
            &mut self.string_heap,
        )?;
        record_swizzle_in(moved);
        Ok(())
    }

    /// Radix partition this worker-local table with `global`'s radix bits and
    /// hand the partitions (and NULL / correlation bookkeeping) to `global`.
    pub fn partition(mut self, global: &Self) -> Result<()> {
        global.check_compatible(&self, "partitioned")?;
        self.swizzle_blocks()?;
        let swizzled = self.swizzled.take();
        let rows = swizzled.count();
        let partitions = swizzle::partition(&self.layout, swizzled, global.radix_bits)?;
        match (&global.correlated, self.correlated.take()) {
            (Some(ours), Some(theirs)) => ours.combine(theirs)?,
            (None, None) => {}
            _ => return Err(JoinError::internal("correlated counts lost during partitioning")),
        }
        global.absorb_partitions(PartitionSet {
            partitions,
            has_null: self.has_null,
        })?;
        record_partition_task();
        tracing::trace!(
            target: "fjoin.exec::external",
            rows,
            radix_bits = global.radix_bits,
            "partitioned local table"
        );
        Ok(())
    }

    /// Plan an external build and partition every local table into `self`.
    ///
    /// Sizes a round from `max_ht_size`, picks the initial radix bits so that
    /// a round holds several partitions, then runs one partition task per
    /// local table on `scheduler`.
    pub fn schedule_partition_tasks(
        &mut self,
        local_tables: Vec<Self>,
        max_ht_size: usize,
        scheduler: &TaskScheduler,
    ) -> Result<()> {
        if self.finalized || self.count() != 0 || self.swizzled_count() != 0 {
            return Err(JoinError::contract(
                "partition tasks need an empty, unfinalized global hash table",
            ));
        }
        let total_count: usize = local_tables
            .iter()
            .map(|t| t.count() + t.swizzled_count())
            .sum();
        let total_size: usize = local_tables
            .iter()
            .map(|t| t.size_in_bytes() + t.swizzled_size())
            .sum::<usize>()
            + self.config.directory_capacity(total_count) * POINTER_WIDTH;
        let avg_tuple_size = (total_size / total_count.max(1)).max(1);
        self.tuples_per_round = if self.config.force_external {
            total_count.div_ceil(3)
        } else {
            max_ht_size / avg_tuple_size
        }
        .max(1);

        self.radix_bits = self.config.initial_radix_bits;
        while self.radix_bits < self.config.max_initial_radix_bits {
            let avg_partition_size = total_size >> self.radix_bits;
            if avg_partition_size.saturating_mul(self.config.partitions_per_round_target)
                < max_ht_size
            {
                break;
            }
            self.radix_bits += 1;
        }

        self.external = true;
        self.external_rows = total_count;
        self.partitions_start = 0;
        self.partitions_end = 0;
        *self.partition_lock.get_mut() = PartitionSet {
            partitions: self.empty_partitions(),
            has_null: false,
        };
        tracing::debug!(
            target: "fjoin.exec::external",
            tables = local_tables.len(),
            rows = total_count,
            bytes = total_size,
            tuples_per_round = self.tuples_per_round,
            radix_bits = self.radix_bits,
            "scheduling partition tasks"
        );

        let global: &Self = self;
        let tasks: Vec<_> = local_tables
            .into_iter()
            .map(|local| move || local.partition(global))
            .collect();
        scheduler.run(tasks)
    }

    /// Partition worker-local probe spills into `self`, aligned with `build`'s radix bits.
    pub fn partition_probe_spills(
        &mut self,
        build: &Self,
        local_spills: Vec<Self>,
        scheduler: &TaskScheduler,
    ) -> Result<()> {
        if !self.keep_null_keys || self.finalized {
            return Err(JoinError::contract(
                "probe spills must be collected into an unfinalized probe spill table",
            ));
        }
        if self.conditions != build.conditions {
            return Err(JoinError::contract(
                "probe spill conditions differ from the build side",
            ));
        }
        self.external = true;
        self.radix_bits = build.radix_bits;
        self.partitions_start = 0;
        self.partitions_end = 0;
        *self.partition_lock.get_mut() = PartitionSet {
            partitions: self.empty_partitions(),
            has_null: false,
        };
        let global: &Self = self;
        let tasks: Vec<_> = local_spills
            .into_iter()
            .map(|local| move || local.partition(global))
            .collect();
        scheduler.run(tasks)
    }

    /// Load and finalize the next round of partitions.
    ///
    /// Returns `false` once every partition has been processed. A partition
    /// larger than `tuples_per_round` is split by adding radix bits; if that
    /// would exceed `max_radix_bits` the join fails with
    /// [`JoinError::ResourceExhausted`].
    pub fn finalize_external(&mut self) -> Result<bool> {
        if !self.external {
            return Err(JoinError::contract("finalize_external on an in-memory join"));
        }
        if self.finalized || self.count() != 0 {
            return Err(JoinError::contract(
                "the previous round must be unfinalized before the next one",
            ));
        }
        let layout = &self.layout;
        let set = self.partition_lock.get_mut();
        self.has_null |= set.has_null;
        self.partitions_start = self.partitions_end;

        loop {
            let Some(first) = set.partitions.get(self.partitions_start) else {
                return Ok(false);
            };
            if first.count() <= self.tuples_per_round {
                break;
            }
            if self.radix_bits >= self.config.max_radix_bits {
                return Err(JoinError::exhausted(format!(
                    "partition {} holds {} rows, more than the {} a round allows, \
                     and radix bits are already at the maximum of {}",
                    self.partitions_start,
                    first.count(),
                    self.tuples_per_round,
                    self.config.max_radix_bits
                )));
            }
            let partitions = std::mem::take(&mut set.partitions);
            set.partitions = refine_partitions(layout, partitions, self.radix_bits)?;
            self.radix_bits += 1;
            self.partitions_start *= 2;
            self.partitions_end = self.partitions_start;
            tracing::debug!(
                target: "fjoin.exec::external",
                radix_bits = self.radix_bits,
                "repartitioned oversized partition"
            );
        }

        let mut end = self.partitions_start;
        let mut rows = 0;
        while let Some(partition) = set.partitions.get(end) {
            if end > self.partitions_start && rows + partition.count() > self.tuples_per_round {
                break;
            }
            rows += partition.count();
            end += 1;
        }
        let mut round = self.swizzled.take();
        for partition in &mut set.partitions[self.partitions_start..end] {
            round.merge(partition.take())?;
        }
        self.swizzled = round;
        self.partitions_end = end;
        self.unswizzle_blocks()?;
        self.finalize()?;
        record_external_round();
        tracing::debug!(
            target: "fjoin.exec::external",
            partitions_start = self.partitions_start,
            partitions_end = self.partitions_end,
            rows,
            "started external round"
        );
        Ok(true)
    }

    /// Drop the rows of the finished round so the next one can be loaded.
    pub fn unfinalize(&mut self) -> Result<()> {
        if !self.external {
            return Err(JoinError::contract("unfinalize on an in-memory join"));
        }
        self.block_collection.clear()?;
        self.string_heap.clear();
        self.directory = Vec::new();
        self.bitmask = 0;
        self.found = Vec::new();
        self.finalized = false;
        Ok(())
    }

    /// Probe the rows of the current round and spill the rest into `local_spill`.
    ///
    /// Only valid in the first round, when every earlier partition is loaded.
    pub fn probe_and_build(
        &self,
        keys: &DataChunk,
        payload: &DataChunk,
        local_spill: &mut Self,
    ) -> Result<ProbeAndBuild<'_>> {
        if !self.external || !self.finalized {
            return Err(JoinError::contract(
                "probe_and_build needs a finalized external hash table",
            ));
        }
        if self.partitions_start != 0 {
            return Err(JoinError::contract(
                "probe_and_build is only valid during the first external round",
            ));
        }
        self.check_keys(keys)?;
        if keys.len() != payload.len() {
            return Err(JoinError::contract(format!(
                "key chunk has {} rows but payload chunk has {}",
                keys.len(),
                payload.len()
            )));
        }
        record_probe_rows(keys.len());
        let hashes = self.hash_keys(keys, &SelectionVector::identity(keys.len()));
        let mut now = SelectionVector::with_capacity(keys.len());
        let mut later = SelectionVector::with_capacity(keys.len());
        for (row, &hash) in hashes.iter().enumerate() {
            if partition_of(hash, self.radix_bits) < self.partitions_end {
                now.push(row);
            } else {
                later.push(row);
            }
        }
        if !later.is_empty() {
            local_spill.build(&keys.slice(&later), &payload.slice(&later))?;
        }
        let now_keys = keys.slice(&now);
        let now_payload = payload.slice(&now);
        let sel = self.prepare_keys(&now_keys, false);
        let sel_hashes: Vec<u64> = sel.iter().map(|row| hashes[now.get(row)]).collect();
        let scan = self.start_scan(now_keys.len(), &sel, &sel_hashes);
        Ok(ProbeAndBuild {
            scan,
            keys: now_keys,
            payload: now_payload,
        })
    }

    /// Load the probe spill rows that belong to `build`'s current round.
    ///
    /// Resets `state` and sets its total to the rows loaded; workers then
    /// claim ranges from it and read them with [`Self::gather_probe_tuples`].
    pub fn prepare_partitioned_probe(
        &mut self,
        build: &Self,
        state: &mut JoinHTScanState,
    ) -> Result<()> {
        if !self.external || self.finalized {
            return Err(JoinError::contract(
                "prepare_partitioned_probe needs a partitioned probe spill table",
            ));
        }
        state.reset();
        self.block_collection.clear()?;
        self.string_heap.clear();

        let layout = &self.layout;
        let set = self.partition_lock.get_mut();
        while self.radix_bits < build.radix_bits {
            let partitions = std::mem::take(&mut set.partitions);
            set.partitions = refine_partitions(layout, partitions, self.radix_bits)?;
            self.radix_bits += 1;
        }
        if self.radix_bits != build.radix_bits {
            return Err(JoinError::internal(format!(
                "probe spill has {} radix bits, build side {}",
                self.radix_bits, build.radix_bits
            )));
        }
        self.partitions_start = build.partitions_start;
        self.partitions_end = build.partitions_end;
        let available = set.partitions.len();
        let window = set
            .partitions
            .get_mut(self.partitions_start..self.partitions_end)
            .ok_or_else(|| {
                JoinError::internal(format!(
                    "round window {}..{} outside {available} probe partitions",
                    build.partitions_start, build.partitions_end,
                ))
            })?;
        let mut round = self.swizzled.take();
        for partition in window {
            round.merge(partition.take())?;
        }
        self.swizzled = round;
        self.unswizzle_blocks()?;
        state.total = self.count();
        Ok(())
    }

    /// Keys and payload of the loaded probe rows `range`, or `None` for an empty range.
    pub fn gather_probe_tuples(
        &self,
        range: Range<usize>,
    ) -> Result<Option<(DataChunk, DataChunk)>> {
        let pointers = self.pointers_in_range(range)?;
        if pointers.is_empty() {
            return Ok(None);
        }
        let keys = self.gather_keys(pointers.iter().map(|&ptr| Some(ptr)))?;
        let payload = self.gather_payload(pointers.iter().map(|&ptr| Some(ptr)))?;
        Ok(Some((keys, payload)))
    }
}

#[cfg(test)]
mod tests {
    use fjoin_types::{JoinCondition, JoinType, LogicalType, Value};

    use super::*;
    use crate::config::JoinConfig;

    fn config() -> JoinConfig {
        JoinConfig {
            min_directory_capacity: 4,
            rows_per_block: 8,
            heap_block_size: 128,
            initial_radix_bits: 2,
            max_initial_radix_bits: 2,
            max_radix_bits: 6,
            force_external: true,
            ..JoinConfig::default()
        }
    }

    fn local(keys: &[i64]) -> JoinHashTable {
        let mut ht = JoinHashTable::new(
            vec![JoinCondition::equal(LogicalType::Int64)],
            vec![LogicalType::Varchar],
            JoinType::Inner,
            config(),
        )
        .expect("table");
        let key_chunk = DataChunk::from_rows(
            &[LogicalType::Int64],
            &keys.iter().map(|&k| vec![Value::Int64(k)]).collect::<Vec<_>>(),
        )
        .expect("keys");
        let payload = DataChunk::from_rows(
            &[LogicalType::Varchar],
            &keys
                .iter()
                .map(|&k| vec![Value::from(format!("row-{k}"))])
                .collect::<Vec<_>>(),
        )
        .expect("payload");
        ht.build(&key_chunk, &payload).expect("build");
        ht
    }

    #[test]
    fn swizzle_round_trip_keeps_count() {
        let mut ht = local(&[1, 2, 3]);
        ht.swizzle_blocks().expect("swizzle");
        assert_eq!(ht.count(), 0);
        assert_eq!(ht.swizzled_count(), 3);
        assert!(ht.swizzled_size() > 0);
        ht.unswizzle_blocks().expect("unswizzle");
        assert_eq!(ht.count(), 3);
        assert_eq!(ht.swizzled_count(), 0);
    }

    #[test]
    fn requires_external_compares_against_budget() {
        let tables = vec![local(&[1, 2, 3]), local(&[4, 5])];
        assert!(JoinHashTable::requires_external(&tables, 16));
        assert!(!JoinHashTable::requires_external(&tables, usize::MAX / 2));
        assert!(!JoinHashTable::requires_external(&[], 0));
    }

    #[test]
    fn partition_rejects_tables_of_another_join() {
        let global = JoinHashTable::new(
            vec![JoinCondition::equal(LogicalType::Int64)],
            vec![LogicalType::Varchar],
            JoinType::Left,
            config(),
        )
        .expect("global");
        let err = local(&[1, 2]).partition(&global).expect_err("inner local into left global");
        assert!(err.is_contract_violation());
        assert_eq!(global.pending_partitioned_rows(), 0);

        let semi = JoinHashTable::new(
            vec![JoinCondition::equal(LogicalType::Int64)],
            vec![LogicalType::Varchar],
            JoinType::Semi,
            config(),
        )
        .expect("semi local");
        let mut global = local(&[]);
        let err = global
            .schedule_partition_tasks(vec![local(&[3]), semi], 1 << 20, &TaskScheduler::new(2))
            .expect_err("mixed join types");
        assert!(err.is_contract_violation());
    }

    #[test]
    fn rounds_cover_every_row_once() {
        let mut global = local(&[]);
        let locals = vec![
            local(&(0..40).collect::<Vec<_>>()),
            local(&(40..90).collect::<Vec<_>>()),
        ];
        global
            .schedule_partition_tasks(locals, 1 << 20, &TaskScheduler::new(2))
            .expect("partition");
        assert!(global.is_external());
        assert_eq!(global.partition_count(), 4);
        assert_eq!(global.tuples_per_round(), 30);
        assert_eq!(global.pending_partitioned_rows(), 90);

        let mut seen = 0;
        let mut rounds = 0;
        while global.finalize_external().expect("round") {
            rounds += 1;
            seen += global.count();
            global.unfinalize().expect("unfinalize");
        }
        assert_eq!(seen, 90);
        assert!(rounds >= 3);
        assert_eq!(global.pending_partitioned_rows(), 0);
        assert!(!global.finalize_external().expect("still done"));
    }

    #[test]
    fn skewed_partition_exhausts_radix_bits() {
        let mut global = local(&[]);
        let skewed = vec![local(&[7; 64]), local(&[1, 2, 3])];
        global
            .schedule_partition_tasks(skewed, 1 << 20, &TaskScheduler::new(1))
            .expect("partition");
        let err = loop {
            match global.finalize_external() {
                Ok(true) => global.unfinalize().expect("unfinalize"),
                Ok(false) => panic!("skewed key fitted into a round"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, JoinError::ResourceExhausted { .. }));
        assert_eq!(global.radix_bits(), 6);
    }

    #[test]
    fn finalize_external_requires_planning() {
        let mut ht = local(&[1]);
        assert!(ht.finalize_external().expect_err("not external").is_contract_violation());
        assert!(ht.unfinalize().expect_err("not external").is_contract_violation());
    }
}
