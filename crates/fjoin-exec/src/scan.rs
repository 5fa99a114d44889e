//! Result production for one probed chunk.
//!
//! A [`ScanStructure`] keeps, for every probe row, the build row its chain
//! walk is currently at, plus the selection of rows whose walk is still
//! going. Each call to [`ScanStructure::next`] produces the next result chunk
//! for the join type of the table it was created from.

use fjoin_error::{JoinError, Result};
use fjoin_rowstore::RowPointer;
use fjoin_types::{
    DataChunk, JoinType, LogicalType, SelectionVector, ValueRef, Vector, VectorBuilder,
};

use crate::instrumentation::record_chain_steps;
use crate::join_hashtable::JoinHashTable;

/// Lazily produces the join result for one probe chunk.
#[derive(Debug)]
pub struct ScanStructure<'a> {
    ht: &'a JoinHashTable,
    probe_len: usize,
    /// Current chain position per probe row.
    pointers: Vec<RowPointer>,
    /// Probe rows whose chain walk is still in progress.
    sel_vector: SelectionVector,
    /// Per probe row: matched at least once. Absent for INNER and RIGHT joins.
    found_match: Option<Vec<bool>>,
    finished: bool,
}

impl<'a> ScanStructure<'a> {
    pub(crate) fn new(ht: &'a JoinHashTable, probe_len: usize) -> Self {
        Self {
            ht,
            probe_len,
            pointers: vec![RowPointer::NULL; probe_len],
            sel_vector: SelectionVector::with_capacity(probe_len),
            found_match: ht
                .join_type()
                .tracks_probe_matches()
                .then(|| vec![false; probe_len]),
            finished: false,
        }
    }

    /// Start the chain walk of `row` at `head` (ignored when the slot is empty).
    pub(crate) fn activate(&mut self, row: usize, head: RowPointer) {
        if !head.is_null() {
            self.pointers[row] = head;
            self.sel_vector.push(row);
        }
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Probe rows whose chain walk has not ended yet.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sel_vector.len()
    }

    #[must_use]
    pub const fn probe_len(&self) -> usize {
        self.probe_len
    }

    /// Which probe rows matched so far, for join types that track it.
    #[must_use]
    pub fn found_match(&self) -> Option<&[bool]> {
        self.found_match.as_deref()
    }

    /// Column types of the chunks [`Self::next`] produces for probe columns `left`.
    #[must_use]
    pub fn result_types(&self, left: &[LogicalType]) -> Vec<LogicalType> {
        let mut types = left.to_vec();
        let join_type = self.ht.join_type();
        if join_type.emits_build_columns() {
            types.extend_from_slice(self.ht.build_types());
        } else if join_type == JoinType::Mark {
            types.push(LogicalType::Boolean);
        }
        types
    }

    /// Produce the next result chunk.
    ///
    /// `keys` must be the chunk that was probed and `left` the probe-side
    /// columns to emit, both with the probed row count. An empty chunk means
    /// the scan is done; afterwards [`Self::is_finished`] holds and every
    /// further call returns an empty chunk.
    pub fn next(&mut self, keys: &DataChunk, left: &DataChunk) -> Result<DataChunk> {
        self.ht.check_keys(keys)?;
        if keys.len() != self.probe_len || left.len() != self.probe_len {
            return Err(JoinError::contract(format!(
                "scan over {} probe rows called with {} keys and {} probe rows",
                self.probe_len,
                keys.len(),
                left.len()
            )));
        }
        if self.finished {
            return Ok(DataChunk::empty(&self.result_types(&left.types())));
        }
        let _span = tracing::debug_span!(
            "join_scan_next",
            join_type = self.ht.join_type().as_str(),
            probe_rows = self.probe_len,
            active = self.sel_vector.len()
        )
        .entered();
        match self.ht.join_type() {
            JoinType::Inner | JoinType::Right => {
                let out = self.next_inner_join(keys, left)?;
                if self.sel_vector.is_empty() {
                    self.finished = true;
                }
                Ok(out)
            }
            JoinType::Left | JoinType::Outer => self.next_left_join(keys, left),
            JoinType::Semi => self.next_semi_or_anti_join(keys, left, true),
            JoinType::Anti => self.next_semi_or_anti_join(keys, left, false),
            JoinType::Mark => self.next_mark_join(keys, left),
            JoinType::Single => self.next_single_join(keys, left),
        }
    }

    fn is_found(&self, row: usize) -> bool {
        self.found_match
            .as_ref()
            .is_some_and(|found| found[row])
    }

    fn set_found(&mut self, rows: &SelectionVector) {
        if let Some(found) = self.found_match.as_mut() {
            for row in rows.iter() {
                found[row] = true;
            }
        }
    }

    /// Split the active rows by whether their current build row satisfies every condition.
    fn resolve_predicates(
        &self,
        keys: &DataChunk,
        match_sel: &mut SelectionVector,
        mut no_match_sel: Option<&mut SelectionVector>,
    ) -> Result<usize> {
        match_sel.clear();
        if let Some(no_match) = no_match_sel.as_deref_mut() {
            no_match.clear();
        }
        for row in self.sel_vector.iter() {
            if self.ht.row_matches(keys, row, self.pointers[row])? {
                match_sel.push(row);
            } else if let Some(no_match) = no_match_sel.as_deref_mut() {
                no_match.push(row);
            }
        }
        record_chain_steps(self.sel_vector.len(), match_sel.len());
        Ok(match_sel.len())
    }

    /// Move the rows of `sel` one step down their chains; the rows that still
    /// have a build row become the active selection.
    fn advance_pointers(&mut self, sel: &SelectionVector) -> Result<()> {
        let mut still_active = SelectionVector::with_capacity(sel.len());
        for row in sel.iter() {
            let next = self.ht.next_in_chain(self.pointers[row])?;
            self.pointers[row] = next;
            if !next.is_null() {
                still_active.push(row);
            }
        }
        self.sel_vector = still_active;
        Ok(())
    }

    fn advance_all(&mut self) -> Result<()> {
        let active = std::mem::take(&mut self.sel_vector);
        self.advance_pointers(&active)
    }

    /// Walk chains until some active row matches; the matches land in `result_sel`.
    fn scan_inner_join(&mut self, keys: &DataChunk, result_sel: &mut SelectionVector) -> Result<usize> {
        loop {
            let matches = self.resolve_predicates(keys, result_sel, None)?;
            self.set_found(result_sel);
            if matches > 0 {
                return Ok(matches);
            }
            self.advance_all()?;
            if self.sel_vector.is_empty() {
                return Ok(0);
            }
        }
    }

    fn next_inner_join(&mut self, keys: &DataChunk, left: &DataChunk) -> Result<DataChunk> {
        let result_types = self.result_types(&left.types());
        if self.sel_vector.is_empty() {
            return Ok(DataChunk::empty(&result_types));
        }
        let mut result_sel = SelectionVector::with_capacity(self.sel_vector.len());
        if self.scan_inner_join(keys, &mut result_sel)? == 0 {
            return Ok(DataChunk::empty(&result_types));
        }
        if self.ht.join_type().is_right_outer() {
            for row in result_sel.iter() {
                self.ht.mark_found(self.pointers[row]);
            }
        }
        let matched: Vec<Option<RowPointer>> =
            result_sel.iter().map(|row| Some(self.pointers[row])).collect();
        let probe_part = left.slice(&result_sel);
        let build_part = self.ht.gather_payload(matched.iter().copied())?;
        self.advance_all()?;
        DataChunk::hstack(probe_part, build_part)
    }

    /// INNER results first; once they run out, every unmatched probe row with NULL build columns.
    fn next_left_join(&mut self, keys: &DataChunk, left: &DataChunk) -> Result<DataChunk> {
        let out = self.next_inner_join(keys, left)?;
        if !out.is_empty() {
            return Ok(out);
        }
        self.finished = true;
        let remaining: SelectionVector = (0..self.probe_len)
            .filter(|&row| !self.is_found(row))
            .collect();
        if remaining.is_empty() {
            return Ok(out);
        }
        let len = remaining.len();
        DataChunk::hstack(left.slice(&remaining), self.ht.null_payload(len)?)
    }

    /// Walk every chain to its first match or its end, recording `found_match`.
    fn scan_key_matches(&mut self, keys: &DataChunk) -> Result<()> {
        let mut match_sel = SelectionVector::with_capacity(self.sel_vector.len());
        let mut no_match_sel = SelectionVector::with_capacity(self.sel_vector.len());
        while !self.sel_vector.is_empty() {
            self.resolve_predicates(keys, &mut match_sel, Some(&mut no_match_sel))?;
            self.set_found(&match_sel);
            self.advance_pointers(&no_match_sel)?;
        }
        Ok(())
    }

    fn next_semi_or_anti_join(
        &mut self,
        keys: &DataChunk,
        left: &DataChunk,
        keep_matched: bool,
    ) -> Result<DataChunk> {
        self.scan_key_matches(keys)?;
        self.finished = true;
        let sel: SelectionVector = (0..self.probe_len)
            .filter(|&row| self.is_found(row) == keep_matched)
            .collect();
        Ok(left.slice(&sel))
    }

    fn next_mark_join(&mut self, keys: &DataChunk, left: &DataChunk) -> Result<DataChunk> {
        self.finished = true;
        let len = self.probe_len;
        let mark = if let Some(info) = self.ht.correlated() {
            self.scan_key_matches(keys)?;
            let counts = info.fetch_counts(keys)?;
            let marked = keys.columns().last().ok_or_else(|| {
                JoinError::contract("correlated MARK join probed without key columns")
            })?;
            let mut builder = VectorBuilder::new(LogicalType::Boolean, len);
            for (row, group) in counts.iter().enumerate() {
                if group.count_star == 0 {
                    builder.push(ValueRef::Boolean(false))?;
                } else if !marked.is_valid(row) {
                    builder.push_null();
                } else if self.is_found(row) {
                    builder.push(ValueRef::Boolean(true))?;
                } else if group.count_star > group.count {
                    builder.push_null();
                } else {
                    builder.push(ValueRef::Boolean(false))?;
                }
            }
            builder.finish()
        } else if self.ht.build_is_empty() {
            if self.ht.has_null() {
                Vector::null_vector(LogicalType::Boolean, len)
            } else {
                let mut builder = VectorBuilder::new(LogicalType::Boolean, len);
                for _ in 0..len {
                    builder.push(ValueRef::Boolean(false))?;
                }
                builder.finish()
            }
        } else {
            self.scan_key_matches(keys)?;
            let null_rejecting: Vec<&Vector> = self
                .ht
                .conditions()
                .iter()
                .zip(keys.columns())
                .filter(|(condition, _)| !condition.null_values_are_equal())
                .map(|(_, column)| column)
                .collect();
            let mut builder = VectorBuilder::new(LogicalType::Boolean, len);
            for row in 0..len {
                if null_rejecting.iter().any(|column| !column.is_valid(row)) {
                    builder.push_null();
                } else if self.is_found(row) {
                    builder.push(ValueRef::Boolean(true))?;
                } else if self.ht.has_null() {
                    builder.push_null();
                } else {
                    builder.push(ValueRef::Boolean(false))?;
                }
            }
            builder.finish()
        };
        let mark = DataChunk::with_len(vec![mark], len)?;
        DataChunk::hstack(left.clone(), mark)
    }

    /// Every probe row once, with the build columns of its first match (or NULLs).
    fn next_single_join(&mut self, keys: &DataChunk, left: &DataChunk) -> Result<DataChunk> {
        self.scan_key_matches(keys)?;
        self.finished = true;
        let matched: Vec<Option<RowPointer>> = (0..self.probe_len)
            .map(|row| self.is_found(row).then_some(self.pointers[row]))
            .collect();
        let build_part = self.ht.gather_payload(matched.iter().copied())?;
        DataChunk::hstack(left.clone(), build_part)
    }
}

#[cfg(test)]
mod tests {
    use fjoin_types::{ComparisonKind, JoinCondition, Value};

    use super::*;
    use crate::config::JoinConfig;

    fn table(join_type: JoinType, rows: &[(Option<i64>, &str)]) -> JoinHashTable {
        let mut ht = JoinHashTable::new(
            vec![JoinCondition::equal(LogicalType::Int64)],
            vec![LogicalType::Varchar],
            join_type,
            JoinConfig {
                min_directory_capacity: 2,
                rows_per_block: 3,
                ..JoinConfig::default()
            },
        )
        .expect("table");
        let keys = DataChunk::from_rows(
            &[LogicalType::Int64],
            &rows.iter().map(|(k, _)| vec![Value::from(*k)]).collect::<Vec<_>>(),
        )
        .expect("keys");
        let payload = DataChunk::from_rows(
            &[LogicalType::Varchar],
            &rows.iter().map(|(_, v)| vec![Value::from(*v)]).collect::<Vec<_>>(),
        )
        .expect("payload");
        ht.build(&keys, &payload).expect("build");
        ht.finalize().expect("finalize");
        ht
    }

    fn probe_keys(keys: &[Option<i64>]) -> DataChunk {
        DataChunk::from_rows(
            &[LogicalType::Int64],
            &keys.iter().map(|k| vec![Value::from(*k)]).collect::<Vec<_>>(),
        )
        .expect("probe keys")
    }

    fn drain(ht: &JoinHashTable, keys: &DataChunk) -> Vec<Vec<Value>> {
        let mut scan = ht.probe(keys).expect("probe");
        let mut rows = Vec::new();
        loop {
            let chunk = scan.next(keys, keys).expect("next");
            if chunk.is_empty() {
                break;
            }
            rows.extend(chunk.rows());
        }
        assert!(scan.is_finished());
        rows
    }

    #[test]
    fn inner_join_emits_every_chain_match() {
        let ht = table(JoinType::Inner, &[(Some(1), "a"), (Some(1), "b"), (Some(2), "c")]);
        let keys = probe_keys(&[Some(1), Some(3), Some(2)]);
        let mut rows = drain(&ht, &keys);
        rows.sort_by_key(|r| format!("{r:?}"));
        assert_eq!(
            rows,
            vec![
                vec![Value::Int64(1), Value::from("a")],
                vec![Value::Int64(1), Value::from("b")],
                vec![Value::Int64(2), Value::from("c")],
            ]
        );
    }

    #[test]
    fn left_join_pads_unmatched_rows() {
        let ht = table(JoinType::Left, &[(Some(1), "a")]);
        let keys = probe_keys(&[Some(1), None, Some(5)]);
        let rows = drain(&ht, &keys);
        assert_eq!(rows.len(), 3);
        assert!(rows.contains(&vec![Value::Int64(1), Value::from("a")]));
        assert!(rows.contains(&vec![Value::Null, Value::Null]));
        assert!(rows.contains(&vec![Value::Int64(5), Value::Null]));
    }

    #[test]
    fn semi_and_anti_partition_the_probe_rows() {
        let build = [(Some(1), "a"), (Some(1), "b"), (Some(4), "c")];
        let keys = probe_keys(&[Some(1), Some(2), None, Some(4)]);
        let semi = drain(&table(JoinType::Semi, &build), &keys);
        let anti = drain(&table(JoinType::Anti, &build), &keys);
        assert_eq!(semi, vec![vec![Value::Int64(1)], vec![Value::Int64(4)]]);
        assert_eq!(anti, vec![vec![Value::Int64(2)], vec![Value::Null]]);
    }

    #[test]
    fn mark_join_is_three_valued() {
        let keys = probe_keys(&[Some(1), Some(2), None]);
        let ht = table(JoinType::Mark, &[(Some(1), "a")]);
        let marks: Vec<Value> = drain(&ht, &keys).into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            marks,
            vec![Value::Boolean(true), Value::Boolean(false), Value::Null]
        );

        let with_null = table(JoinType::Mark, &[(Some(1), "a"), (None, "n")]);
        let marks: Vec<Value> = drain(&with_null, &keys).into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(marks, vec![Value::Boolean(true), Value::Null, Value::Null]);
    }

    #[test]
    fn mark_join_on_empty_table() {
        let keys = probe_keys(&[Some(1), None]);
        let empty = table(JoinType::Mark, &[]);
        let marks: Vec<Value> = drain(&empty, &keys).into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(marks, vec![Value::Boolean(false), Value::Boolean(false)]);

        let only_nulls = table(JoinType::Mark, &[(None, "n")]);
        let marks: Vec<Value> = drain(&only_nulls, &keys).into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(marks, vec![Value::Null, Value::Null]);
    }

    #[test]
    fn single_join_takes_one_match_per_row() {
        let ht = table(JoinType::Single, &[(Some(1), "a"), (Some(1), "b")]);
        let keys = probe_keys(&[Some(1), Some(9)]);
        let rows = drain(&ht, &keys);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Value::Int64(1));
        assert!(rows[0][1] == Value::from("a") || rows[0][1] == Value::from("b"));
        assert_eq!(rows[1], vec![Value::Int64(9), Value::Null]);
    }

    #[test]
    fn non_equality_conditions_filter_chain_matches() {
        let mut ht = JoinHashTable::new(
            vec![
                JoinCondition::equal(LogicalType::Int64),
                JoinCondition::new(ComparisonKind::LessThan, LogicalType::Int64),
            ],
            vec![LogicalType::Int64],
            JoinType::Inner,
            JoinConfig::default(),
        )
        .expect("table");
        let types = [LogicalType::Int64, LogicalType::Int64];
        let keys = DataChunk::from_rows(
            &types,
            &[
                vec![Value::Int64(1), Value::Int64(10)],
                vec![Value::Int64(1), Value::Int64(20)],
            ],
        )
        .expect("keys");
        let payload = keys.project(1..2);
        ht.build(&keys, &payload).expect("build");
        ht.finalize().expect("finalize");

        // probe.b < build.b
        let probe = DataChunk::from_rows(&types, &[vec![Value::Int64(1), Value::Int64(15)]])
            .expect("probe");
        let mut scan = ht.probe(&probe).expect("probe");
        let chunk = scan.next(&probe, &probe.project(0..1)).expect("next");
        assert_eq!(chunk.rows(), vec![vec![Value::Int64(1), Value::Int64(20)]]);
    }

    #[test]
    fn next_checks_chunk_lengths() {
        let ht = table(JoinType::Inner, &[(Some(1), "a")]);
        let keys = probe_keys(&[Some(1)]);
        let mut scan = ht.probe(&keys).expect("probe");
        let other = probe_keys(&[Some(1), Some(2)]);
        assert!(scan.next(&keys, &other).expect_err("length").is_contract_violation());
    }

    #[test]
    fn next_rejects_key_chunks_missing_a_condition_column() {
        let mut ht = JoinHashTable::new(
            vec![
                JoinCondition::equal(LogicalType::Int64),
                JoinCondition::new(ComparisonKind::LessThan, LogicalType::Int64),
            ],
            vec![LogicalType::Int64],
            JoinType::Inner,
            JoinConfig::default(),
        )
        .expect("table");
        let types = [LogicalType::Int64, LogicalType::Int64];
        let build = DataChunk::from_rows(&types, &[vec![Value::Int64(1), Value::Int64(10)]])
            .expect("build keys");
        ht.build(&build, &build.project(1..2)).expect("build");
        ht.finalize().expect("finalize");

        // 50 < 10 fails, so dropping the second column would fabricate a match.
        let probe = DataChunk::from_rows(&types, &[vec![Value::Int64(1), Value::Int64(50)]])
            .expect("probe");
        let mut scan = ht.probe(&probe).expect("probe");
        let narrow = probe.project(0..1);
        let err = scan.next(&narrow, &narrow).expect_err("one key column for two conditions");
        assert!(err.is_contract_violation());

        let wrong_type = DataChunk::from_rows(
            &[LogicalType::Int64, LogicalType::Varchar],
            &[vec![Value::Int64(1), Value::from("50")]],
        )
        .expect("mistyped keys");
        assert!(scan.next(&wrong_type, &narrow).is_err());
        assert!(scan.next(&probe, &narrow).expect("well-formed keys").is_empty());
    }

    #[test]
    fn result_types_follow_join_type() {
        let left = [LogicalType::Int64];
        let keys = probe_keys(&[Some(1)]);
        for (join_type, expected) in [
            (JoinType::Inner, vec![LogicalType::Int64, LogicalType::Varchar]),
            (JoinType::Single, vec![LogicalType::Int64, LogicalType::Varchar]),
            (JoinType::Semi, vec![LogicalType::Int64]),
            (JoinType::Mark, vec![LogicalType::Int64, LogicalType::Boolean]),
        ] {
            let ht = table(join_type, &[(Some(1), "a")]);
            let scan = ht.probe(&keys).expect("probe");
            assert_eq!(scan.result_types(&left), expected, "{join_type}");
        }
    }

    #[test]
    fn finished_scan_keeps_returning_empty_chunks() {
        let ht = table(JoinType::Anti, &[(Some(1), "a")]);
        let keys = probe_keys(&[Some(2)]);
        let mut scan = ht.probe(&keys).expect("probe");
        assert_eq!(scan.next(&keys, &keys).expect("first").len(), 1);
        assert!(scan.is_finished());
        assert!(scan.next(&keys, &keys).expect("again").is_empty());
    }
}
