//! Chained hash table for equi-joins.
//!
//! Rows are appended by [`JoinHashTable::build`] into a [`RowBlockStore`],
//! linked into per-slot chains by [`JoinHashTable::finalize`] and looked up by
//! [`JoinHashTable::probe`], which hands back a [`ScanStructure`] that emits
//! the join result chunk by chunk.
//!
//! Parallel builds use one table per worker followed by
//! [`JoinHashTable::merge`]; probing only needs `&self`, so any number of
//! workers may probe a finalized table at once. Build-side match flags for
//! RIGHT/FULL OUTER joins live out of row as atomics for that reason.

mod external;

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use fjoin_error::{JoinError, Result};
use fjoin_rowstore::layout::POINTER_WIDTH;
use fjoin_rowstore::row::{read_hash, read_next, read_value, write_hash, write_next, write_value};
use fjoin_rowstore::swizzle::{self, SwizzledRows};
use fjoin_rowstore::{RowBlockStore, RowLayout, RowPointer, StringHeap};
use fjoin_types::hash::hash_columns;
use fjoin_types::{
    DataChunk, JoinCondition, JoinType, LogicalType, SelectionVector, Vector, VectorBuilder,
};
use parking_lot::Mutex;

use crate::config::JoinConfig;
use crate::correlated::CorrelatedMarkJoinInfo;
use crate::instrumentation::{record_build_rows, record_finalize, record_probe_rows};
use crate::scan::ScanStructure;
use crate::scan_state::JoinHTScanState;

pub use external::ProbeAndBuild;

/// Radix partitions of an external join; the mutex is `partition_lock`.
#[derive(Debug, Default)]
struct PartitionSet {
    partitions: Vec<SwizzledRows>,
    has_null: bool,
}

/// Hash table over the build side of a join.
pub struct JoinHashTable {
    config: JoinConfig,
    join_type: JoinType,
    conditions: Vec<JoinCondition>,
    /// Conditions `0..equality_count` are equalities and feed the hash.
    equality_count: usize,
    build_types: Vec<LogicalType>,
    layout: RowLayout,
    /// Store rows whose keys are NULL instead of dropping them.
    keep_null_keys: bool,
    has_null: bool,
    finalized: bool,
    block_collection: RowBlockStore,
    string_heap: StringHeap,
    directory: Vec<RowPointer>,
    bitmask: u64,
    /// One flag per stored row, allocated by `finalize` for RIGHT/FULL OUTER.
    found: Vec<Box<[AtomicBool]>>,
    correlated: Option<CorrelatedMarkJoinInfo>,

    external: bool,
    /// Build rows across all partitions, fixed when the external build is planned.
    external_rows: usize,
    radix_bits: u32,
    tuples_per_round: usize,
    partitions_start: usize,
    partitions_end: usize,
    swizzled: SwizzledRows,
    partition_lock: Mutex<PartitionSet>,
}

impl fmt::Debug for JoinHashTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHashTable")
            .field("join_type", &self.join_type)
            .field("conditions", &self.conditions)
            .field("build_types", &self.build_types)
            .field("count", &self.count())
            .field("swizzled_count", &self.swizzled_count())
            .field("has_null", &self.has_null)
            .field("finalized", &self.finalized)
            .field("directory_capacity", &self.directory.len())
            .field("external", &self.external)
            .field("radix_bits", &self.radix_bits)
            .field("partitions", &(self.partitions_start..self.partitions_end))
            .finish_non_exhaustive()
    }
}

impl JoinHashTable {
    /// Create an empty table.
    ///
    /// `conditions` describe the key columns (one per condition, equalities
    /// first); `build_types` the payload columns stored next to them.
    pub fn new(
        conditions: Vec<JoinCondition>,
        build_types: Vec<LogicalType>,
        join_type: JoinType,
        config: JoinConfig,
    ) -> Result<Self> {
        Self::with_options(conditions, build_types, join_type, config, None, false)
    }

    /// Create the table of a correlated MARK join.
    ///
    /// The leading `correlated_types.len()` conditions compare the correlation
    /// columns; the last one compares the marked value.
    pub fn new_correlated_mark(
        conditions: Vec<JoinCondition>,
        build_types: Vec<LogicalType>,
        correlated_types: Vec<LogicalType>,
        config: JoinConfig,
    ) -> Result<Self> {
        if conditions.len() != correlated_types.len() + 1 {
            return Err(JoinError::contract(format!(
                "correlated MARK join with {} correlated columns needs {} conditions, got {}",
                correlated_types.len(),
                correlated_types.len() + 1,
                conditions.len()
            )));
        }
        for (idx, (condition, &ty)) in conditions.iter().zip(&correlated_types).enumerate() {
            if condition.key_type() != ty {
                return Err(JoinError::type_mismatch(ty, condition.key_type()));
            }
            // Groups are counted before NULL filtering, so a NULL correlation
            // value must stay comparable or its row would count without matching.
            if !condition.is_equality() || !condition.null_values_are_equal() {
                return Err(JoinError::contract(format!(
                    "correlation condition {idx} must compare NULLs as equal, got {}",
                    condition.comparison().as_str()
                )));
            }
        }
        let info = CorrelatedMarkJoinInfo::new(correlated_types);
        Self::with_options(conditions, build_types, JoinType::Mark, config, Some(info), false)
    }

    /// Create a table that buffers probe rows of an external join for later rounds.
    ///
    /// Probe spills keep rows with NULL keys, since LEFT, ANTI and MARK joins
    /// still have to emit them.
    pub fn new_probe_spill(
        conditions: Vec<JoinCondition>,
        probe_payload_types: Vec<LogicalType>,
        config: JoinConfig,
    ) -> Result<Self> {
        Self::with_options(conditions, probe_payload_types, JoinType::Inner, config, None, true)
    }

    fn with_options(
        conditions: Vec<JoinCondition>,
        build_types: Vec<LogicalType>,
        join_type: JoinType,
        config: JoinConfig,
        correlated: Option<CorrelatedMarkJoinInfo>,
        probe_spill: bool,
    ) -> Result<Self> {
        config.validate()?;
        let equality_count = conditions.iter().take_while(|c| c.is_equality()).count();
        if equality_count == 0 {
            return Err(JoinError::contract(
                "a hash join needs at least one equality condition, listed first",
            ));
        }
        if conditions[equality_count..].iter().any(JoinCondition::is_equality) {
            return Err(JoinError::contract(
                "equality conditions must precede all other conditions",
            ));
        }
        let layout = RowLayout::new(
            conditions
                .iter()
                .map(JoinCondition::key_type)
                .chain(build_types.iter().copied())
                .collect(),
        );
        let block_collection = RowBlockStore::new(layout.entry_size(), config.rows_per_block);
        let string_heap = StringHeap::new(config.heap_block_size);
        let swizzled = SwizzledRows::new(layout.entry_size(), config.rows_per_block);
        Ok(Self {
            radix_bits: config.initial_radix_bits,
            join_type,
            conditions,
            equality_count,
            build_types,
            layout,
            keep_null_keys: probe_spill || join_type.is_right_outer(),
            has_null: false,
            finalized: false,
            block_collection,
            string_heap,
            directory: Vec::new(),
            bitmask: 0,
            found: Vec::new(),
            correlated,
            external: false,
            external_rows: 0,
            tuples_per_round: 0,
            partitions_start: 0,
            partitions_end: 0,
            swizzled,
            partition_lock: Mutex::new(PartitionSet::default()),
            config,
        })
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub const fn join_type(&self) -> JoinType {
        self.join_type
    }

    #[must_use]
    pub fn conditions(&self) -> &[JoinCondition] {
        &self.conditions
    }

    #[must_use]
    pub fn condition_types(&self) -> Vec<LogicalType> {
        self.conditions.iter().map(JoinCondition::key_type).collect()
    }

    #[must_use]
    pub fn build_types(&self) -> &[LogicalType] {
        &self.build_types
    }

    #[must_use]
    pub const fn layout(&self) -> &RowLayout {
        &self.layout
    }

    #[must_use]
    pub const fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Whether a build row was dropped for having a NULL key.
    #[must_use]
    pub const fn has_null(&self) -> bool {
        self.has_null
    }

    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    #[must_use]
    pub const fn correlated(&self) -> Option<&CorrelatedMarkJoinInfo> {
        self.correlated.as_ref()
    }

    /// Slots in the hash directory (zero before `finalize`).
    #[must_use]
    pub fn directory_capacity(&self) -> usize {
        self.directory.len()
    }

    #[must_use]
    pub const fn bitmask(&self) -> u64 {
        self.bitmask
    }

    // ── Introspection ──────────────────────────────────────────────────────

    /// Resident rows.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.block_collection.count()
    }

    /// Bytes held by resident rows and strings, plus the directory they need.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.block_collection.size_in_bytes()
            + self.string_heap.size_in_bytes()
            + self.count() * 3 * POINTER_WIDTH
    }

    /// Whether the build side holds no rows at all, counting every external round.
    pub(crate) const fn build_is_empty(&self) -> bool {
        if self.external {
            self.external_rows == 0
        } else {
            self.count() == 0
        }
    }

    /// Rows held in swizzled form.
    #[must_use]
    pub const fn swizzled_count(&self) -> usize {
        self.swizzled.count()
    }

    #[must_use]
    pub fn swizzled_size(&self) -> usize {
        self.swizzled.size_in_bytes()
    }

    // ── Build ──────────────────────────────────────────────────────────────

    fn check_chunk(what: &str, expected: &[LogicalType], chunk: &DataChunk) -> Result<()> {
        if chunk.column_count() != expected.len() {
            return Err(JoinError::contract(format!(
                "{what} chunk has {} columns, expected {}",
                chunk.column_count(),
                expected.len()
            )));
        }
        for (idx, (column, &ty)) in chunk.columns().iter().zip(expected).enumerate() {
            if column.logical_type() != ty {
                return Err(JoinError::type_mismatch(
                    format!("{what} column {idx} of type {ty}"),
                    column.logical_type(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn check_keys(&self, keys: &DataChunk) -> Result<()> {
        Self::check_chunk("key", &self.condition_types(), keys)
    }

    fn check_build_input(&self, keys: &DataChunk, payload: &DataChunk) -> Result<()> {
        self.check_keys(keys)?;
        Self::check_chunk("payload", &self.build_types, payload)?;
        if keys.len() != payload.len() {
            return Err(JoinError::contract(format!(
                "key chunk has {} rows but payload chunk has {}",
                keys.len(),
                payload.len()
            )));
        }
        Ok(())
    }

    /// Rows of `keys` that can take part in a match.
    ///
    /// A NULL key only survives where its condition treats NULLs as equal.
    /// Build sides that keep NULL keys keep every row.
    pub(crate) fn prepare_keys(&self, keys: &DataChunk, build_side: bool) -> SelectionVector {
        if build_side && self.keep_null_keys {
            return SelectionVector::identity(keys.len());
        }
        let filtered: Vec<(&JoinCondition, &Vector)> = self
            .conditions
            .iter()
            .zip(keys.columns())
            .filter(|(condition, column)| {
                !condition.null_values_are_equal() && column.validity().has_nulls()
            })
            .collect();
        if filtered.is_empty() {
            return SelectionVector::identity(keys.len());
        }
        (0..keys.len())
            .filter(|&row| filtered.iter().all(|(_, column)| column.is_valid(row)))
            .collect()
    }

    pub(crate) fn hash_keys(&self, keys: &DataChunk, sel: &SelectionVector) -> Vec<u64> {
        hash_columns(&keys.columns()[..self.equality_count], sel)
    }

    /// Append a chunk of build rows.
    ///
    /// `keys` holds one column per condition and `payload` one per build
    /// type. Rows whose keys cannot match are skipped (and noted in
    /// [`Self::has_null`]) unless this table keeps NULL keys.
    pub fn build(&mut self, keys: &DataChunk, payload: &DataChunk) -> Result<()> {
        if self.finalized {
            return Err(JoinError::contract("build called on a finalized hash table"));
        }
        self.check_build_input(keys, payload)?;
        if keys.is_empty() {
            return Ok(());
        }
        if let Some(info) = &self.correlated {
            info.add_chunk(keys)?;
        }
        let sel = self.prepare_keys(keys, true);
        let skipped = keys.len() - sel.len();
        if skipped > 0 {
            self.has_null = true;
        }
        record_build_rows(sel.len(), skipped);
        if sel.is_empty() {
            return Ok(());
        }
        let hashes = self.hash_keys(keys, &sel);
        let key_count = self.conditions.len();
        for (row, hash) in sel.iter().zip(hashes) {
            let (_, bytes) = self.block_collection.append_row()?;
            for (col, column) in keys.columns().iter().enumerate() {
                write_value(&self.layout, bytes, col, column.value_ref(row), &mut self.string_heap)?;
            }
            for (idx, column) in payload.columns().iter().enumerate() {
                write_value(
                    &self.layout,
                    bytes,
                    key_count + idx,
                    column.value_ref(row),
                    &mut self.string_heap,
                )?;
            }
            write_hash(&self.layout, bytes, hash)?;
            write_next(&self.layout, bytes, RowPointer::NULL)?;
        }
        Ok(())
    }

    /// Absorb a worker-local table built for the same join.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if self.finalized || other.finalized {
            return Err(JoinError::contract("cannot merge finalized hash tables"));
        }
        self.check_compatible(&other, "merged")?;
        let Self {
            block_collection: mut rows,
            string_heap,
            swizzled,
            has_null,
            correlated,
            partition_lock,
            ..
        } = other;
        let heap_base = self.string_heap.merge(string_heap)?;
        swizzle::rebase_store(&self.layout, &mut rows, heap_base)?;
        self.block_collection.merge(rows)?;
        self.swizzled.merge(swizzled)?;
        self.has_null |= has_null;
        match (&self.correlated, correlated) {
            (Some(ours), Some(theirs)) => ours.combine(theirs)?,
            (None, None) => {}
            _ => return Err(JoinError::internal("correlated counts lost during merge")),
        }
        self.absorb_partitions(partition_lock.into_inner())
    }

    /// Reject combining tables built for different joins.
    pub(crate) fn check_compatible(&self, other: &Self, what: &str) -> Result<()> {
        if self.layout != other.layout
            || self.conditions != other.conditions
            || self.join_type != other.join_type
            || self.keep_null_keys != other.keep_null_keys
        {
            return Err(JoinError::contract(format!(
                "{what} hash tables must share join type, conditions and layout"
            )));
        }
        let ours = self.correlated.as_ref().map(CorrelatedMarkJoinInfo::correlated_types);
        let theirs = other.correlated.as_ref().map(CorrelatedMarkJoinInfo::correlated_types);
        if ours != theirs {
            return Err(JoinError::contract(format!(
                "{what} hash tables disagree on correlated MARK columns"
            )));
        }
        Ok(())
    }

    /// Fold partitions produced elsewhere into this table's partition set.
    fn absorb_partitions(&self, incoming: PartitionSet) -> Result<()> {
        let mut set = self.partition_lock.lock();
        set.has_null |= incoming.has_null;
        if incoming.partitions.is_empty() {
            return Ok(());
        }
        if set.partitions.is_empty() {
            set.partitions = incoming.partitions;
            return Ok(());
        }
        if set.partitions.len() != incoming.partitions.len() {
            return Err(JoinError::internal(format!(
                "cannot merge {} partitions into {}",
                incoming.partitions.len(),
                set.partitions.len()
            )));
        }
        for (ours, theirs) in set.partitions.iter_mut().zip(incoming.partitions) {
            ours.merge(theirs)?;
        }
        Ok(())
    }

    // ── Finalize ───────────────────────────────────────────────────────────

    /// Size the directory and chain every stored row into its slot.
    ///
    /// The row inserted last heads its chain. After this no more rows may be
    /// added until [`Self::unfinalize`].
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(JoinError::contract("finalize called twice"));
        }
        let capacity = self.config.directory_capacity(self.count());
        self.directory = vec![RowPointer::NULL; capacity];
        self.bitmask = capacity as u64 - 1;
        for block_idx in 0..self.block_collection.block_count() {
            let block = self.block_collection.block_mut(block_idx)?;
            let block_id = u32::try_from(block_idx)
                .map_err(|_| JoinError::internal("block index beyond u32"))?;
            for row in 0..block.count() {
                let bytes = block.row_mut(row)?;
                let slot = (read_hash(&self.layout, bytes)? & self.bitmask) as usize;
                write_next(&self.layout, bytes, self.directory[slot])?;
                let row_id =
                    u32::try_from(row).map_err(|_| JoinError::internal("row index beyond u32"))?;
                self.directory[slot] = RowPointer::new(block_id, row_id);
            }
        }
        if self.join_type.is_right_outer() {
            self.found = self
                .block_collection
                .blocks()
                .iter()
                .map(|block| (0..block.count()).map(|_| AtomicBool::new(false)).collect())
                .collect();
        }
        self.finalized = true;
        record_finalize();
        tracing::debug!(
            target: "fjoin.exec::join_hashtable",
            rows = self.count(),
            capacity,
            join_type = self.join_type.as_str(),
            "finalized hash table"
        );
        Ok(())
    }

    // ── Probe ──────────────────────────────────────────────────────────────

    /// Look up a chunk of probe keys and return the scan producing the result.
    pub fn probe(&self, keys: &DataChunk) -> Result<ScanStructure<'_>> {
        if !self.finalized {
            return Err(JoinError::contract("probe called before finalize"));
        }
        self.check_keys(keys)?;
        record_probe_rows(keys.len());
        let sel = self.prepare_keys(keys, false);
        let hashes = self.hash_keys(keys, &sel);
        Ok(self.start_scan(keys.len(), &sel, &hashes))
    }

    /// Scan over `probe_len` rows of which the `sel` rows (hashed as `hashes`) are candidates.
    pub(crate) fn start_scan(
        &self,
        probe_len: usize,
        sel: &SelectionVector,
        hashes: &[u64],
    ) -> ScanStructure<'_> {
        let mut scan = ScanStructure::new(self, probe_len);
        for (row, &hash) in sel.iter().zip(hashes) {
            scan.activate(row, self.bucket(hash));
        }
        scan
    }

    pub(crate) fn bucket(&self, hash: u64) -> RowPointer {
        self.directory
            .get((hash & self.bitmask) as usize)
            .copied()
            .unwrap_or(RowPointer::NULL)
    }

    /// Every row chained into the slot `hash` maps to, head first.
    pub fn chain(&self, hash: u64) -> Result<Vec<RowPointer>> {
        let mut out = Vec::new();
        let mut ptr = self.bucket(hash);
        while !ptr.is_null() {
            out.push(ptr);
            ptr = self.next_in_chain(ptr)?;
        }
        Ok(out)
    }

    pub(crate) fn next_in_chain(&self, ptr: RowPointer) -> Result<RowPointer> {
        read_next(&self.layout, self.block_collection.row(ptr)?)
    }

    /// Whether the build row at `ptr` satisfies every condition for `probe_row`.
    pub(crate) fn row_matches(
        &self,
        keys: &DataChunk,
        probe_row: usize,
        ptr: RowPointer,
    ) -> Result<bool> {
        let bytes = self.block_collection.row(ptr)?;
        for (col, (condition, column)) in self.conditions.iter().zip(keys.columns()).enumerate() {
            let build = read_value(&self.layout, bytes, col, &self.string_heap)?;
            if !condition.matches(column.value_ref(probe_row), build) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read column `col` of the given rows; `None` yields NULL.
    pub(crate) fn gather_column(
        &self,
        col: usize,
        rows: impl ExactSizeIterator<Item = Option<RowPointer>>,
    ) -> Result<Vector> {
        let mut builder = VectorBuilder::new(self.layout.types()[col], rows.len());
        for ptr in rows {
            match ptr {
                Some(ptr) => {
                    let bytes = self.block_collection.row(ptr)?;
                    builder.push(read_value(&self.layout, bytes, col, &self.string_heap)?)?;
                }
                None => builder.push_null(),
            }
        }
        Ok(builder.finish())
    }

    /// Payload columns of the given rows.
    pub(crate) fn gather_payload(
        &self,
        rows: impl ExactSizeIterator<Item = Option<RowPointer>> + Clone,
    ) -> Result<DataChunk> {
        let len = rows.len();
        let key_count = self.conditions.len();
        let columns = (0..self.build_types.len())
            .map(|idx| self.gather_column(key_count + idx, rows.clone()))
            .collect::<Result<Vec<_>>>()?;
        DataChunk::with_len(columns, len)
    }

    /// Key columns of the given rows.
    pub(crate) fn gather_keys(
        &self,
        rows: impl ExactSizeIterator<Item = Option<RowPointer>> + Clone,
    ) -> Result<DataChunk> {
        let len = rows.len();
        let columns = (0..self.conditions.len())
            .map(|col| self.gather_column(col, rows.clone()))
            .collect::<Result<Vec<_>>>()?;
        DataChunk::with_len(columns, len)
    }

    /// NULL payload columns for `len` rows.
    pub(crate) fn null_payload(&self, len: usize) -> Result<DataChunk> {
        DataChunk::with_len(
            self.build_types
                .iter()
                .map(|&ty| Vector::null_vector(ty, len))
                .collect(),
            len,
        )
    }

    /// Flag the build row at `ptr` as matched (RIGHT/FULL OUTER only).
    pub(crate) fn mark_found(&self, ptr: RowPointer) {
        if let Some(flag) = self.found.get(ptr.block()).and_then(|f| f.get(ptr.row())) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    fn is_found(&self, block: usize, row: usize) -> bool {
        self.found
            .get(block)
            .and_then(|f| f.get(row))
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    // ── Full outer ─────────────────────────────────────────────────────────

    fn check_full_outer(&self) -> Result<()> {
        if !self.finalized {
            return Err(JoinError::contract("full outer scan before finalize"));
        }
        if !self.join_type.is_right_outer() {
            return Err(JoinError::contract(format!(
                "full outer scan on a {} join",
                self.join_type.as_str()
            )));
        }
        Ok(())
    }

    /// Collect up to `vector_size` build rows that never matched, resuming at `state`.
    ///
    /// Call only after every probe of the table has finished. Returns the
    /// number of pointers written to `addresses`; zero means the scan is done.
    pub fn scan_full_outer(
        &self,
        state: &mut JoinHTScanState,
        addresses: &mut Vec<RowPointer>,
    ) -> Result<usize> {
        self.check_full_outer()?;
        addresses.clear();
        let limit = self.config.vector_size;
        while state.block_position < self.found.len() && addresses.len() < limit {
            let block = state.block_position;
            let flags = &self.found[block];
            while state.position < flags.len() && addresses.len() < limit {
                if !flags[state.position].load(Ordering::Relaxed) {
                    addresses.push(pointer_at(block, state.position)?);
                }
                state.position += 1;
                state.scan_index += 1;
            }
            if state.position >= flags.len() {
                state.block_position += 1;
                state.position = 0;
            }
        }
        Ok(addresses.len())
    }

    /// Prepare `state` for parallel full outer scanning with [`Self::scan_full_outer_range`].
    pub fn init_full_outer_scan(&self, state: &mut JoinHTScanState) {
        state.reset();
        state.total = self.count();
    }

    /// Unmatched build rows among the rows `range` (numbered across blocks).
    pub fn scan_full_outer_range(
        &self,
        range: Range<usize>,
        addresses: &mut Vec<RowPointer>,
    ) -> Result<usize> {
        self.check_full_outer()?;
        addresses.clear();
        for ptr in self.pointers_in_range(range)? {
            if !self.is_found(ptr.block(), ptr.row()) {
                addresses.push(ptr);
            }
        }
        Ok(addresses.len())
    }

    /// Result rows for unmatched build rows: NULL probe columns then the build payload.
    pub fn gather_full_outer(
        &self,
        left_types: &[LogicalType],
        addresses: &[RowPointer],
    ) -> Result<DataChunk> {
        let len = addresses.len();
        let left = DataChunk::with_len(
            left_types
                .iter()
                .map(|&ty| Vector::null_vector(ty, len))
                .collect(),
            len,
        )?;
        let right = self.gather_payload(addresses.iter().map(|&ptr| Some(ptr)))?;
        DataChunk::hstack(left, right)
    }

    /// Pointers to the stored rows `range`, numbering rows across blocks in order.
    pub(crate) fn pointers_in_range(&self, range: Range<usize>) -> Result<Vec<RowPointer>> {
        let mut out = Vec::with_capacity(range.len());
        let mut first_row = 0;
        for (block_idx, block) in self.block_collection.blocks().iter().enumerate() {
            let block_end = first_row + block.count();
            if block_end > range.start && first_row < range.end {
                let from = range.start.max(first_row) - first_row;
                let to = range.end.min(block_end) - first_row;
                for row in from..to {
                    out.push(pointer_at(block_idx, row)?);
                }
            }
            if block_end >= range.end {
                break;
            }
            first_row = block_end;
        }
        Ok(out)
    }
}

fn pointer_at(block: usize, row: usize) -> Result<RowPointer> {
    match (u32::try_from(block), u32::try_from(row)) {
        (Ok(block), Ok(row)) => Ok(RowPointer::new(block, row)),
        _ => Err(JoinError::internal(format!(
            "row {row} of block {block} is not addressable"
        ))),
    }
}
