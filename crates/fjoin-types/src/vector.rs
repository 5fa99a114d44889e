//! Columnar vectors, validity bitmaps and selection vectors.

use fjoin_error::{JoinError, Result};

use crate::logical_type::LogicalType;
use crate::value::{Value, ValueRef};

// ── Validity ───────────────────────────────────────────────────────────────

/// Validity bitmap: a set bit means the value is present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NullBitmap {
    bytes: Vec<u8>,
    len: usize,
}

impl NullBitmap {
    #[must_use]
    pub fn all_valid(len: usize) -> Self {
        Self {
            bytes: vec![0xFF; len.div_ceil(8)],
            len,
        }
    }

    #[must_use]
    pub fn all_null(len: usize) -> Self {
        Self {
            bytes: vec![0; len.div_ceil(8)],
            len,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Out-of-range rows read as NULL.
    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        row < self.len && self.bytes[row / 8] & (1_u8 << (row % 8)) != 0
    }

    pub fn set(&mut self, row: usize, valid: bool) {
        if row >= self.len {
            return;
        }
        let mask = 1_u8 << (row % 8);
        if valid {
            self.bytes[row / 8] |= mask;
        } else {
            self.bytes[row / 8] &= !mask;
        }
    }

    pub fn push(&mut self, valid: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        self.len += 1;
        self.set(self.len - 1, valid);
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        (0..self.len).filter(|&row| !self.is_valid(row)).count()
    }

    #[must_use]
    pub fn has_nulls(&self) -> bool {
        (0..self.len).any(|row| !self.is_valid(row))
    }
}

// ── Column Data ────────────────────────────────────────────────────────────

/// Physical storage of a vector. NULL slots hold a default placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    /// `offsets` has one more entry than there are rows.
    Varchar { offsets: Vec<u32>, data: Vec<u8> },
}

impl ColumnData {
    fn with_capacity(logical_type: LogicalType, capacity: usize) -> Self {
        match logical_type {
            LogicalType::Boolean => Self::Boolean(Vec::with_capacity(capacity)),
            LogicalType::Int32 => Self::Int32(Vec::with_capacity(capacity)),
            LogicalType::Int64 => Self::Int64(Vec::with_capacity(capacity)),
            LogicalType::Float64 => Self::Float64(Vec::with_capacity(capacity)),
            LogicalType::Varchar => {
                let mut offsets = Vec::with_capacity(capacity + 1);
                offsets.push(0);
                Self::Varchar {
                    offsets,
                    data: Vec::new(),
                }
            }
        }
    }

    #[must_use]
    pub const fn logical_type(&self) -> LogicalType {
        match self {
            Self::Boolean(_) => LogicalType::Boolean,
            Self::Int32(_) => LogicalType::Int32,
            Self::Int64(_) => LogicalType::Int64,
            Self::Float64(_) => LogicalType::Float64,
            Self::Varchar { .. } => LogicalType::Varchar,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Varchar { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Vector ─────────────────────────────────────────────────────────────────

/// A typed column of values with a validity bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    data: ColumnData,
    validity: NullBitmap,
}

impl Vector {
    /// Build a vector from owned values; every non-NULL value must have `logical_type`.
    pub fn from_values(logical_type: LogicalType, values: &[Value]) -> Result<Self> {
        let mut builder = VectorBuilder::new(logical_type, values.len());
        for value in values {
            builder.push(value.as_value_ref())?;
        }
        Ok(builder.finish())
    }

    /// A vector of `len` NULLs.
    #[must_use]
    pub fn null_vector(logical_type: LogicalType, len: usize) -> Self {
        let mut builder = VectorBuilder::new(logical_type, len);
        for _ in 0..len {
            builder.push_null();
        }
        builder.finish()
    }

    #[must_use]
    pub fn empty(logical_type: LogicalType) -> Self {
        VectorBuilder::new(logical_type, 0).finish()
    }

    #[must_use]
    pub const fn logical_type(&self) -> LogicalType {
        self.data.logical_type()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.validity.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    #[must_use]
    pub const fn data(&self) -> &ColumnData {
        &self.data
    }

    #[must_use]
    pub const fn validity(&self) -> &NullBitmap {
        &self.validity
    }

    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        self.validity.is_valid(row)
    }

    /// Borrow the value at `row`. NULL and out-of-range rows read as [`ValueRef::Null`].
    #[must_use]
    pub fn value_ref(&self, row: usize) -> ValueRef<'_> {
        if !self.validity.is_valid(row) {
            return ValueRef::Null;
        }
        match &self.data {
            ColumnData::Boolean(v) => ValueRef::Boolean(v[row]),
            ColumnData::Int32(v) => ValueRef::Int32(v[row]),
            ColumnData::Int64(v) => ValueRef::Int64(v[row]),
            ColumnData::Float64(v) => ValueRef::Float64(v[row]),
            ColumnData::Varchar { offsets, data } => {
                let start = offsets[row] as usize;
                let end = offsets[row + 1] as usize;
                // Only the builder writes `data`, always from `&str`.
                ValueRef::Varchar(std::str::from_utf8(&data[start..end]).unwrap_or_default())
            }
        }
    }

    #[must_use]
    pub fn value(&self, row: usize) -> Value {
        self.value_ref(row).to_value()
    }

    /// Gather the rows named by `sel`, in selection order.
    #[must_use]
    pub fn slice(&self, sel: &SelectionVector) -> Self {
        let mut builder = VectorBuilder::new(self.logical_type(), sel.len());
        for row in sel.iter() {
            builder.push_unchecked(self.value_ref(row));
        }
        builder.finish()
    }
}

/// Append-only builder for a [`Vector`].
#[derive(Debug)]
pub struct VectorBuilder {
    data: ColumnData,
    validity: NullBitmap,
}

impl VectorBuilder {
    #[must_use]
    pub fn new(logical_type: LogicalType, capacity: usize) -> Self {
        Self {
            data: ColumnData::with_capacity(logical_type, capacity),
            validity: NullBitmap::default(),
        }
    }

    #[must_use]
    pub const fn logical_type(&self) -> LogicalType {
        self.data.logical_type()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.validity.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    /// Append a value; NULL is always accepted.
    pub fn push(&mut self, value: ValueRef<'_>) -> Result<()> {
        if let Some(actual) = value.logical_type() {
            if actual != self.logical_type() {
                return Err(JoinError::type_mismatch(self.logical_type(), actual));
            }
        }
        if let (ValueRef::Varchar(s), ColumnData::Varchar { data, .. }) = (value, &self.data) {
            let end = data.len() + s.len();
            if u32::try_from(end).is_err() {
                return Err(JoinError::OutOfRange {
                    what: "varchar vector bytes",
                    value: end as u64,
                    limit: u64::from(u32::MAX),
                });
            }
        }
        self.push_unchecked(value);
        Ok(())
    }

    pub fn push_null(&mut self) {
        self.push_unchecked(ValueRef::Null);
    }

    /// Append a value already known to match the builder type.
    fn push_unchecked(&mut self, value: ValueRef<'_>) {
        let valid = !value.is_null();
        match (&mut self.data, value) {
            (ColumnData::Boolean(v), ValueRef::Boolean(x)) => v.push(x),
            (ColumnData::Int32(v), ValueRef::Int32(x)) => v.push(x),
            (ColumnData::Int64(v), ValueRef::Int64(x)) => v.push(x),
            (ColumnData::Float64(v), ValueRef::Float64(x)) => v.push(x),
            (ColumnData::Varchar { offsets, data }, ValueRef::Varchar(x)) => {
                data.extend_from_slice(x.as_bytes());
                offsets.push(data.len() as u32);
            }
            (ColumnData::Boolean(v), _) => v.push(false),
            (ColumnData::Int32(v), _) => v.push(0),
            (ColumnData::Int64(v), _) => v.push(0),
            (ColumnData::Float64(v), _) => v.push(0.0),
            (ColumnData::Varchar { offsets, data }, _) => offsets.push(data.len() as u32),
        }
        self.validity.push(valid);
    }

    #[must_use]
    pub fn finish(self) -> Vector {
        Vector {
            data: self.data,
            validity: self.validity,
        }
    }
}

// ── Selection Vector ───────────────────────────────────────────────────────

/// Ordered list of row indices into a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionVector {
    indices: Vec<u32>,
}

impl SelectionVector {
    /// `0..len`.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            indices: (0..len as u32).collect(),
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: usize) {
        self.indices.push(row as u32);
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> usize {
        self.indices[idx] as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().map(|&row| row as usize)
    }
}

impl FromIterator<usize> for SelectionVector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().map(|row| row as u32).collect(),
        }
    }
}
