//! Grouped match counts for correlated MARK joins.
//!
//! A correlated `x IN (subquery)` is answered per correlation group: the
//! leading key columns name the group and the last key column is the value
//! compared against `x`. For every group the build side records `COUNT(*)`
//! and `COUNT(value)`, which decide between FALSE and NULL when no match is
//! found.

use fjoin_error::{JoinError, Result};
use fjoin_types::value::canonical_f64;
use fjoin_types::{DataChunk, LogicalType, ValueRef, Vector};
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

type GroupKey = SmallVec<[u8; 32]>;

/// `COUNT(*)` and `COUNT(value)` of one correlation group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCounts {
    pub count_star: i64,
    pub count: i64,
}

/// Shared state of a correlated MARK join.
#[derive(Debug)]
pub struct CorrelatedMarkJoinInfo {
    correlated_types: Vec<LogicalType>,
    /// `mj_lock`: build-side inserts and probe-side lookups both go through it.
    counts: Mutex<HashMap<GroupKey, GroupCounts>>,
}

impl CorrelatedMarkJoinInfo {
    #[must_use]
    pub fn new(correlated_types: Vec<LogicalType>) -> Self {
        Self {
            correlated_types,
            counts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn correlated_types(&self) -> &[LogicalType] {
        &self.correlated_types
    }

    /// Number of distinct correlation groups seen so far.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.counts.lock().len()
    }

    fn split<'a>(&self, keys: &'a DataChunk) -> Result<(&'a [Vector], &'a Vector)> {
        let groups = self.correlated_types.len();
        if keys.column_count() != groups + 1 {
            return Err(JoinError::contract(format!(
                "correlated MARK join expects {} key columns, got {}",
                groups + 1,
                keys.column_count()
            )));
        }
        let columns = keys.columns();
        Ok((&columns[..groups], &columns[groups]))
    }

    /// Count the rows of a build-side key chunk into their groups.
    pub fn add_chunk(&self, keys: &DataChunk) -> Result<()> {
        let (group_columns, value_column) = self.split(keys)?;
        let mut counts = self.counts.lock();
        for row in 0..keys.len() {
            let entry = counts.entry(group_key(group_columns, row)).or_default();
            entry.count_star += 1;
            if value_column.is_valid(row) {
                entry.count += 1;
            }
        }
        Ok(())
    }

    /// Counts for the group of every row of a probe-side key chunk.
    pub fn fetch_counts(&self, keys: &DataChunk) -> Result<Vec<GroupCounts>> {
        let (group_columns, _) = self.split(keys)?;
        let counts = self.counts.lock();
        Ok((0..keys.len())
            .map(|row| {
                counts
                    .get(&group_key(group_columns, row))
                    .copied()
                    .unwrap_or_default()
            })
            .collect())
    }

    /// Fold another table's counts into this one.
    pub fn combine(&self, other: Self) -> Result<()> {
        if other.correlated_types != self.correlated_types {
            return Err(JoinError::contract(
                "cannot combine correlated counts of different correlation types",
            ));
        }
        let theirs = other.counts.into_inner();
        let mut ours = self.counts.lock();
        for (key, counts) in theirs {
            let entry = ours.entry(key).or_default();
            entry.count_star += counts.count_star;
            entry.count += counts.count;
        }
        Ok(())
    }
}

/// Byte encoding of a group: NULL groups with NULL, floats by canonical bits.
fn group_key(columns: &[Vector], row: usize) -> GroupKey {
    let mut key = GroupKey::new();
    for column in columns {
        match column.value_ref(row) {
            ValueRef::Null => key.push(0),
            ValueRef::Boolean(v) => key.extend_from_slice(&[1, u8::from(v)]),
            ValueRef::Int32(v) => {
                key.push(1);
                key.extend_from_slice(&v.to_le_bytes());
            }
            ValueRef::Int64(v) => {
                key.push(1);
                key.extend_from_slice(&v.to_le_bytes());
            }
            ValueRef::Float64(v) => {
                key.push(1);
                key.extend_from_slice(&canonical_f64(v).to_bits().to_le_bytes());
            }
            ValueRef::Varchar(v) => {
                key.push(1);
                key.extend_from_slice(&(v.len() as u64).to_le_bytes());
                key.extend_from_slice(v.as_bytes());
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use fjoin_types::Value;

    use super::*;

    fn keys(rows: &[(Option<i64>, Option<i64>)]) -> DataChunk {
        let rows: Vec<Vec<Value>> = rows
            .iter()
            .map(|&(group, value)| vec![Value::from(group), Value::from(value)])
            .collect();
        DataChunk::from_rows(&[LogicalType::Int64, LogicalType::Int64], &rows).expect("keys")
    }

    #[test]
    fn counts_per_group_including_null_group() {
        let info = CorrelatedMarkJoinInfo::new(vec![LogicalType::Int64]);
        info.add_chunk(&keys(&[
            (Some(1), Some(10)),
            (Some(1), None),
            (Some(2), Some(20)),
            (None, Some(30)),
        ]))
        .expect("add");
        assert_eq!(info.group_count(), 3);

        let got = info
            .fetch_counts(&keys(&[(Some(1), None), (Some(2), None), (Some(3), None), (None, None)]))
            .expect("fetch");
        assert_eq!(got[0], GroupCounts { count_star: 2, count: 1 });
        assert_eq!(got[1], GroupCounts { count_star: 1, count: 1 });
        assert_eq!(got[2], GroupCounts::default());
        assert_eq!(got[3], GroupCounts { count_star: 1, count: 1 });
    }

    #[test]
    fn combine_adds_counts() {
        let a = CorrelatedMarkJoinInfo::new(vec![LogicalType::Int64]);
        let b = CorrelatedMarkJoinInfo::new(vec![LogicalType::Int64]);
        a.add_chunk(&keys(&[(Some(1), Some(1))])).expect("add a");
        b.add_chunk(&keys(&[(Some(1), None), (Some(4), Some(4))])).expect("add b");
        a.combine(b).expect("combine");
        let got = a.fetch_counts(&keys(&[(Some(1), None)])).expect("fetch");
        assert_eq!(got[0], GroupCounts { count_star: 2, count: 1 });
        assert_eq!(a.group_count(), 2);
    }

    #[test]
    fn wrong_key_width_is_contract_violation() {
        let info = CorrelatedMarkJoinInfo::new(vec![LogicalType::Int64, LogicalType::Int64]);
        let err = info.add_chunk(&keys(&[(Some(1), Some(1))])).expect_err("width");
        assert!(err.is_contract_violation());
    }
}
