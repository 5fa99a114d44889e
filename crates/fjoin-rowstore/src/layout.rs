//! Byte layout of a stored build row.
//!
//! ```text
//! [ column slots ... ][ validity bits ][ hash: u64 ][ next: RowPointer ]
//! |<-------------------- tuple_size ------------------>|
//! |<------------------------- entry_size ------------------------------>|
//! ```

use fjoin_types::LogicalType;

/// Width of the chain pointer that trails every entry.
pub const POINTER_WIDTH: usize = 8;
/// Width of the stored key hash.
pub const HASH_WIDTH: usize = 8;
/// Width of a tagged heap reference.
pub const HEAP_REF_WIDTH: usize = 8;
/// A VARCHAR slot is a heap reference followed by a `u32` byte length.
pub const VARCHAR_SLOT_WIDTH: usize = HEAP_REF_WIDTH + 4;

/// Bytes occupied by one column slot of type `ty`.
#[must_use]
pub const fn slot_width(ty: LogicalType) -> usize {
    match ty {
        LogicalType::Boolean => 1,
        LogicalType::Int32 => 4,
        LogicalType::Int64 | LogicalType::Float64 => 8,
        LogicalType::Varchar => VARCHAR_SLOT_WIDTH,
    }
}

/// Column offsets and sizes of a stored row. Computed once per table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    types: Vec<LogicalType>,
    offsets: Vec<usize>,
    validity_offset: usize,
    hash_offset: usize,
    tuple_size: usize,
    entry_size: usize,
    all_constant: bool,
}

impl RowLayout {
    #[must_use]
    pub fn new(types: Vec<LogicalType>) -> Self {
        let mut offsets = Vec::with_capacity(types.len());
        let mut cursor = 0;
        for &ty in &types {
            offsets.push(cursor);
            cursor += slot_width(ty);
        }
        let validity_offset = cursor;
        let hash_offset = validity_offset + types.len().div_ceil(8);
        let tuple_size = hash_offset + HASH_WIDTH;
        let all_constant = !types.iter().any(|ty| ty.is_variable_length());
        Self {
            types,
            offsets,
            validity_offset,
            hash_offset,
            tuple_size,
            entry_size: tuple_size + POINTER_WIDTH,
            all_constant,
        }
    }

    #[must_use]
    pub fn types(&self) -> &[LogicalType] {
        &self.types
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn column_offset(&self, col: usize) -> usize {
        self.offsets[col]
    }

    #[must_use]
    pub const fn validity_offset(&self) -> usize {
        self.validity_offset
    }

    #[must_use]
    pub const fn hash_offset(&self) -> usize {
        self.hash_offset
    }

    /// Bytes of serialized row data, including validity and hash.
    #[must_use]
    pub const fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Offset of the embedded chain pointer.
    #[must_use]
    pub const fn pointer_offset(&self) -> usize {
        self.tuple_size
    }

    /// Full entry width: `tuple_size + POINTER_WIDTH`.
    #[must_use]
    pub const fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// True when no column spills into the string heap.
    #[must_use]
    pub const fn all_constant(&self) -> bool {
        self.all_constant
    }

    /// Indices of heap-backed columns.
    pub fn variable_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, ty)| ty.is_variable_length())
            .map(|(col, _)| col)
    }
}
