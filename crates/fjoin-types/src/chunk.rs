//! Data chunks: a batch of equally long vectors.

use std::ops::Range;

use fjoin_error::{JoinError, Result};

use crate::logical_type::LogicalType;
use crate::value::Value;
use crate::vector::{SelectionVector, Vector};

/// A batch of rows stored column-wise.
///
/// A chunk may have zero columns and still carry a row count (a build side
/// without payload columns, for example).
#[derive(Debug, Clone, PartialEq)]
pub struct DataChunk {
    columns: Vec<Vector>,
    len: usize,
}

impl DataChunk {
    /// Build a chunk from columns of equal length.
    pub fn new(columns: Vec<Vector>) -> Result<Self> {
        let len = columns.first().map_or(0, Vector::len);
        Self::with_len(columns, len)
    }

    /// Build a chunk with an explicit row count; every column must have `len` rows.
    pub fn with_len(columns: Vec<Vector>, len: usize) -> Result<Self> {
        if let Some((idx, column)) = columns.iter().enumerate().find(|(_, c)| c.len() != len) {
            return Err(JoinError::contract(format!(
                "column {idx} has {} rows, chunk has {len}",
                column.len()
            )));
        }
        Ok(Self { columns, len })
    }

    /// Zero-row chunk with the given schema.
    #[must_use]
    pub fn empty(types: &[LogicalType]) -> Self {
        Self {
            columns: types.iter().map(|&ty| Vector::empty(ty)).collect(),
            len: 0,
        }
    }

    /// Build a chunk from row-major values (mostly for tests and fixtures).
    pub fn from_rows(types: &[LogicalType], rows: &[Vec<Value>]) -> Result<Self> {
        let mut columns = Vec::with_capacity(types.len());
        for (col, &ty) in types.iter().enumerate() {
            let mut values = Vec::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                let value = row.get(col).ok_or_else(|| {
                    JoinError::contract(format!(
                        "row {row_idx} has {} values, schema has {}",
                        row.len(),
                        types.len()
                    ))
                })?;
                values.push(value.clone());
            }
            columns.push(Vector::from_values(ty, &values)?);
        }
        Self::with_len(columns, rows.len())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column(&self, idx: usize) -> Option<&Vector> {
        self.columns.get(idx)
    }

    #[must_use]
    pub fn columns(&self) -> &[Vector] {
        &self.columns
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<Vector> {
        self.columns
    }

    #[must_use]
    pub fn types(&self) -> Vec<LogicalType> {
        self.columns.iter().map(Vector::logical_type).collect()
    }

    /// Gather rows by selection.
    #[must_use]
    pub fn slice(&self, sel: &SelectionVector) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.slice(sel)).collect(),
            len: sel.len(),
        }
    }

    /// Keep only the columns in `range`.
    #[must_use]
    pub fn project(&self, range: Range<usize>) -> Self {
        Self {
            columns: self.columns[range].to_vec(),
            len: self.len,
        }
    }

    /// Place the columns of `right` after the columns of `left`.
    pub fn hstack(left: Self, right: Self) -> Result<Self> {
        if left.len != right.len {
            return Err(JoinError::contract(format!(
                "cannot stack chunks of {} and {} rows",
                left.len, right.len
            )));
        }
        let len = left.len;
        let mut columns = left.columns;
        columns.extend(right.columns);
        Ok(Self { columns, len })
    }

    #[must_use]
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.len).map(|row| self.row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataChunk {
        DataChunk::from_rows(
            &[LogicalType::Int64, LogicalType::Varchar],
            &[
                vec![Value::Int64(1), Value::from("a")],
                vec![Value::Int64(2), Value::Null],
                vec![Value::Null, Value::from("c")],
            ],
        )
        .expect("sample chunk")
    }

    #[test]
    fn rows_round_trip() {
        let chunk = sample();
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.types(), vec![LogicalType::Int64, LogicalType::Varchar]);
        assert_eq!(chunk.row(1), vec![Value::Int64(2), Value::Null]);
    }

    #[test]
    fn ragged_columns_rejected() {
        let a = Vector::from_values(LogicalType::Int64, &[Value::Int64(1)]).expect("a");
        let b = Vector::empty(LogicalType::Int64);
        assert!(DataChunk::new(vec![a, b]).is_err());
    }

    #[test]
    fn zero_column_chunk_keeps_len() {
        let chunk = DataChunk::with_len(Vec::new(), 5).expect("empty columns");
        assert_eq!(chunk.len(), 5);
        let sliced = chunk.slice(&SelectionVector::identity(2));
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced.column_count(), 0);
    }

    #[test]
    fn project_and_hstack() {
        let chunk = sample();
        let left = chunk.project(0..1);
        let right = chunk.project(1..2);
        let stacked = DataChunk::hstack(left, right).expect("stack");
        assert_eq!(stacked, chunk);
        assert!(DataChunk::hstack(sample(), DataChunk::empty(&[LogicalType::Int64])).is_err());
    }
}
