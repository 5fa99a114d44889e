//! Relocatable row collections and radix partitioning.
//!
//! A resident row refers to its strings by `(heap block, offset)`. Swizzling
//! copies each data block's strings into one heap segment paired with that
//! block and rewrites the references as segment-relative offsets, so a block
//! and its segment can move to another table, or another partition, as a unit.

use fjoin_error::{JoinError, Result};

use crate::block::RowBlockStore;
use crate::heap::StringHeap;
use crate::layout::RowLayout;
use crate::pointer::HeapRef;
use crate::row::{self, is_valid, read_hash, read_heap_slot, write_heap_ref};

/// Partition index of `hash` under `radix_bits`: its top `radix_bits` bits.
#[must_use]
pub const fn partition_of(hash: u64, radix_bits: u32) -> usize {
    if radix_bits == 0 {
        0
    } else {
        (hash >> (64 - radix_bits)) as usize
    }
}

/// Swizzled rows: data block `i` owns heap segment `i`.
#[derive(Debug)]
pub struct SwizzledRows {
    rows: RowBlockStore,
    heaps: Vec<Vec<u8>>,
}

impl SwizzledRows {
    #[must_use]
    pub fn new(entry_size: usize, rows_per_block: usize) -> Self {
        Self {
            rows: RowBlockStore::new(entry_size, rows_per_block),
            heaps: Vec::new(),
        }
    }

    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(self.rows.entry_size(), self.rows.rows_per_block())
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.rows.count()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.rows.block_count()
    }

    #[must_use]
    pub const fn rows(&self) -> &RowBlockStore {
        &self.rows
    }

    /// Row bytes plus heap segment bytes.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.rows.size_in_bytes() + self.heaps.iter().map(Vec::len).sum::<usize>()
    }

    /// Move every block/segment pair of `other` behind ours.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        for (block, heap) in other.rows.into_blocks().into_iter().zip(other.heaps) {
            self.rows.push_block(block)?;
            self.heaps.push(heap);
        }
        Ok(())
    }

    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = self.empty_like();
        std::mem::replace(self, empty)
    }

    /// Copy one swizzled row (and its strings from `source_heap`) to the end.
    fn append_row(&mut self, layout: &RowLayout, row: &[u8], source_heap: &[u8]) -> Result<()> {
        let (ptr, dst) = self.rows.append_row()?;
        dst.copy_from_slice(row);
        if ptr.block() == self.heaps.len() {
            self.heaps.push(Vec::new());
        }
        let segment = &mut self.heaps[ptr.block()];
        for col in layout.variable_columns() {
            if !is_valid(layout, dst, col) {
                continue;
            }
            let (raw, len) = read_heap_slot(layout, dst, col)?;
            let HeapRef::Swizzled { offset } = HeapRef::decode(raw) else {
                return Err(JoinError::corrupt(format!(
                    "column {col} is resident inside a swizzled collection"
                )));
            };
            let start = offset as usize;
            let bytes = source_heap.get(start..start + len as usize).ok_or_else(|| {
                JoinError::corrupt(format!(
                    "swizzled range {start}+{len} beyond segment of {} bytes",
                    source_heap.len()
                ))
            })?;
            let new_offset = segment.len() as u64;
            segment.extend_from_slice(bytes);
            write_heap_ref(layout, dst, col, HeapRef::Swizzled { offset: new_offset })?;
        }
        Ok(())
    }
}

/// Convert resident rows into a relocatable collection.
///
/// `heap` is only read; the caller releases it once every row has moved.
pub fn swizzle(layout: &RowLayout, rows: RowBlockStore, heap: &StringHeap) -> Result<SwizzledRows> {
    let mut out = SwizzledRows::new(rows.entry_size(), rows.rows_per_block());
    let row_count = rows.count();
    for mut block in rows.into_blocks() {
        let mut segment = Vec::new();
        if !layout.all_constant() {
            for idx in 0..block.count() {
                let row_bytes = block.row_mut(idx)?;
                for col in layout.variable_columns() {
                    if !is_valid(layout, row_bytes, col) {
                        continue;
                    }
                    let (raw, len) = read_heap_slot(layout, row_bytes, col)?;
                    let HeapRef::Resident { block: heap_block, offset } = HeapRef::decode(raw)
                    else {
                        return Err(JoinError::corrupt(format!(
                            "column {col} swizzled twice"
                        )));
                    };
                    let bytes = heap.get(heap_block, offset, len)?;
                    let new_offset = segment.len() as u64;
                    segment.extend_from_slice(bytes);
                    write_heap_ref(layout, row_bytes, col, HeapRef::Swizzled { offset: new_offset })?;
                }
            }
        }
        out.rows.push_block(block)?;
        out.heaps.push(segment);
    }
    tracing::trace!(
        target: "fjoin.rowstore::swizzle",
        rows = row_count,
        blocks = out.block_count(),
        heap_bytes = out.size_in_bytes() - out.rows.size_in_bytes(),
        "swizzled row collection"
    );
    Ok(out)
}

/// Move a swizzled collection back into resident `rows` / `heap`.
pub fn unswizzle(
    layout: &RowLayout,
    swizzled: SwizzledRows,
    rows: &mut RowBlockStore,
    heap: &mut StringHeap,
) -> Result<()> {
    let SwizzledRows {
        rows: swizzled_rows,
        heaps,
    } = swizzled;
    for (mut block, segment) in swizzled_rows.into_blocks().into_iter().zip(heaps) {
        if !layout.all_constant() {
            let heap_block = heap.push_block(segment)?;
            for idx in 0..block.count() {
                let row_bytes = block.row_mut(idx)?;
                for col in layout.variable_columns() {
                    if !is_valid(layout, row_bytes, col) {
                        continue;
                    }
                    let (raw, _) = read_heap_slot(layout, row_bytes, col)?;
                    let HeapRef::Swizzled { offset } = HeapRef::decode(raw) else {
                        return Err(JoinError::corrupt(format!(
                            "column {col} unswizzled twice"
                        )));
                    };
                    let offset = u32::try_from(offset).map_err(|_| JoinError::OutOfRange {
                        what: "heap segment offset",
                        value: offset,
                        limit: u64::from(u32::MAX),
                    })?;
                    write_heap_ref(
                        layout,
                        row_bytes,
                        col,
                        HeapRef::Resident {
                            block: heap_block,
                            offset,
                        },
                    )?;
                }
            }
        }
        rows.push_block(block)?;
    }
    Ok(())
}

/// Radix-partition swizzled rows into the partitions `first..first + count`
/// of a `radix_bits` partitioning. Every row must fall inside that window.
pub fn partition_window(
    layout: &RowLayout,
    swizzled: SwizzledRows,
    radix_bits: u32,
    first: usize,
    count: usize,
) -> Result<Vec<SwizzledRows>> {
    let template = swizzled.empty_like();
    let mut out: Vec<SwizzledRows> = (0..count).map(|_| template.empty_like()).collect();
    let SwizzledRows {
        rows: source_rows,
        heaps,
    } = swizzled;
    for (block_idx, segment) in heaps.iter().enumerate() {
        let handle = source_rows.pin(block_idx)?;
        for (_, row_bytes) in handle.rows() {
            let partition = partition_of(read_hash(layout, row_bytes)?, radix_bits);
            let slot = partition
                .checked_sub(first)
                .filter(|&slot| slot < count)
                .ok_or_else(|| {
                    JoinError::internal(format!(
                        "row in partition {partition} outside window {first}..{}",
                        first + count
                    ))
                })?;
            out[slot].append_row(layout, row_bytes, segment)?;
        }
    }
    Ok(out)
}

/// Radix-partition swizzled rows into all `2^radix_bits` partitions.
pub fn partition(layout: &RowLayout, swizzled: SwizzledRows, radix_bits: u32) -> Result<Vec<SwizzledRows>> {
    partition_window(layout, swizzled, radix_bits, 0, 1_usize << radix_bits)
}

/// Shift every resident heap reference in `rows` by `block_base`.
pub fn rebase_store(layout: &RowLayout, rows: &mut RowBlockStore, block_base: u32) -> Result<()> {
    if layout.all_constant() || block_base == 0 {
        return Ok(());
    }
    for block_idx in 0..rows.block_count() {
        let block = rows.block_mut(block_idx)?;
        for idx in 0..block.count() {
            row::rebase_heap_refs(layout, block.row_mut(idx)?, block_base)?;
        }
    }
    Ok(())
}
