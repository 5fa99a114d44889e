//! Append-only row blocks with scoped pinning.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use fjoin_error::{JoinError, Result};

use crate::pointer::RowPointer;

// ── Row Block ──────────────────────────────────────────────────────────────

/// A fixed-capacity block of row entries.
pub struct RowBlock {
    data: Vec<u8>,
    entry_size: usize,
    count: usize,
    capacity: usize,
    /// Outstanding [`BlockHandle`]s.
    pins: AtomicU32,
}

impl RowBlock {
    fn new(entry_size: usize, capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(entry_size * capacity),
            entry_size,
            count: 0,
            capacity,
            pins: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    /// Bytes of row data held by this block.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pins.load(Ordering::Relaxed) > 0
    }

    pub fn row(&self, row: usize) -> Result<&[u8]> {
        if row >= self.count {
            return Err(JoinError::corrupt(format!(
                "row {row} beyond block of {} rows",
                self.count
            )));
        }
        let start = row * self.entry_size;
        Ok(&self.data[start..start + self.entry_size])
    }

    pub fn row_mut(&mut self, row: usize) -> Result<&mut [u8]> {
        if row >= self.count {
            return Err(JoinError::corrupt(format!(
                "row {row} beyond block of {} rows",
                self.count
            )));
        }
        let start = row * self.entry_size;
        Ok(&mut self.data[start..start + self.entry_size])
    }

    fn push_zeroed(&mut self) -> (usize, &mut [u8]) {
        let row = self.count;
        let start = self.data.len();
        self.data.resize(start + self.entry_size, 0);
        self.count += 1;
        (row, &mut self.data[start..])
    }

    fn pin(&self) {
        let _ = self.pins.fetch_add(1, Ordering::Relaxed);
    }

    fn unpin(&self) {
        let mut current = self.pins.load(Ordering::Relaxed);
        while current > 0 {
            match self.pins.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl fmt::Debug for RowBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowBlock")
            .field("entry_size", &self.entry_size)
            .field("count", &self.count)
            .field("capacity", &self.capacity)
            .field("pins", &self.pins.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Scoped pin on a [`RowBlock`]; dropping the handle unpins the block.
#[derive(Debug)]
pub struct BlockHandle<'a> {
    block: &'a RowBlock,
    index: usize,
}

impl<'a> BlockHandle<'a> {
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.block.count
    }

    pub fn row(&self, row: usize) -> Result<&'a [u8]> {
        self.block.row(row)
    }

    /// Iterate over the rows of the pinned block together with their pointers.
    pub fn rows(&self) -> impl Iterator<Item = (RowPointer, &'a [u8])> + 'a {
        let block = self.block;
        let index = self.index as u32;
        block
            .data
            .chunks_exact(block.entry_size)
            .enumerate()
            .map(move |(row, bytes)| (RowPointer::new(index, row as u32), bytes))
    }
}

impl Drop for BlockHandle<'_> {
    fn drop(&mut self) {
        self.block.unpin();
    }
}

// ── Row Block Store ────────────────────────────────────────────────────────

/// Append-only collection of row blocks addressed by [`RowPointer`].
#[derive(Debug)]
pub struct RowBlockStore {
    entry_size: usize,
    rows_per_block: usize,
    blocks: Vec<RowBlock>,
    count: usize,
}

impl RowBlockStore {
    #[must_use]
    pub fn new(entry_size: usize, rows_per_block: usize) -> Self {
        Self {
            entry_size,
            rows_per_block: rows_per_block.clamp(1, u32::MAX as usize),
            blocks: Vec::new(),
            count: 0,
        }
    }

    /// An empty store with the same geometry.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(self.entry_size, self.rows_per_block)
    }

    #[must_use]
    pub const fn entry_size(&self) -> usize {
        self.entry_size
    }

    #[must_use]
    pub const fn rows_per_block(&self) -> usize {
        self.rows_per_block
    }

    /// Total rows across blocks.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn blocks(&self) -> &[RowBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.blocks.iter().map(RowBlock::size_in_bytes).sum()
    }

    /// Allocate a zeroed entry at the end of the store.
    pub fn append_row(&mut self) -> Result<(RowPointer, &mut [u8])> {
        if self.blocks.last().is_none_or(RowBlock::is_full) {
            if self.blocks.len() >= u32::MAX as usize {
                return Err(JoinError::exhausted("row block index space exhausted"));
            }
            self.blocks
                .push(RowBlock::new(self.entry_size, self.rows_per_block));
        }
        let block_idx = self.blocks.len() - 1;
        self.count += 1;
        let block = &mut self.blocks[block_idx];
        let (row, bytes) = block.push_zeroed();
        Ok((RowPointer::new(block_idx as u32, row as u32), bytes))
    }

    /// Bounds-checked row access.
    pub fn row(&self, ptr: RowPointer) -> Result<&[u8]> {
        self.blocks
            .get(ptr.block())
            .ok_or_else(|| dangling(ptr, self.blocks.len()))?
            .row(ptr.row())
    }

    pub fn row_mut(&mut self, ptr: RowPointer) -> Result<&mut [u8]> {
        let block_count = self.blocks.len();
        self.blocks
            .get_mut(ptr.block())
            .ok_or_else(|| dangling(ptr, block_count))?
            .row_mut(ptr.row())
    }

    pub fn block_mut(&mut self, block: usize) -> Result<&mut RowBlock> {
        let block_count = self.blocks.len();
        self.blocks.get_mut(block).ok_or_else(|| {
            JoinError::corrupt(format!("block {block} beyond store of {block_count} blocks"))
        })
    }

    /// Pin a block for the lifetime of the returned handle.
    pub fn pin(&self, block: usize) -> Result<BlockHandle<'_>> {
        let target = self.blocks.get(block).ok_or_else(|| {
            JoinError::corrupt(format!(
                "pin of block {block} beyond store of {} blocks",
                self.blocks.len()
            ))
        })?;
        target.pin();
        Ok(BlockHandle {
            block: target,
            index: block,
        })
    }

    #[must_use]
    pub fn any_pinned(&self) -> bool {
        self.blocks.iter().any(RowBlock::is_pinned)
    }

    /// Release every block.
    pub fn clear(&mut self) -> Result<()> {
        if self.any_pinned() {
            return Err(JoinError::contract("cannot clear a store with pinned blocks"));
        }
        self.blocks.clear();
        self.count = 0;
        Ok(())
    }

    /// Move the contents out, leaving an empty store with the same geometry.
    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = self.empty_like();
        std::mem::replace(self, empty)
    }

    /// Append another store's blocks. Returns the block index of the first moved block.
    pub fn merge(&mut self, other: Self) -> Result<usize> {
        if other.entry_size != self.entry_size {
            return Err(JoinError::contract(format!(
                "cannot merge stores with entry sizes {} and {}",
                self.entry_size, other.entry_size
            )));
        }
        let base = self.blocks.len();
        for block in other.blocks {
            self.push_block(block)?;
        }
        Ok(base)
    }

    /// Append a whole block.
    pub fn push_block(&mut self, block: RowBlock) -> Result<usize> {
        if block.entry_size != self.entry_size {
            return Err(JoinError::contract(format!(
                "block entry size {} does not match store entry size {}",
                block.entry_size, self.entry_size
            )));
        }
        if block.is_pinned() {
            return Err(JoinError::contract("cannot move a pinned block"));
        }
        if self.blocks.len() >= u32::MAX as usize {
            return Err(JoinError::exhausted("row block index space exhausted"));
        }
        self.count += block.count;
        self.blocks.push(block);
        Ok(self.blocks.len() - 1)
    }

    /// Consume the store, yielding its blocks in order.
    #[must_use]
    pub fn into_blocks(self) -> Vec<RowBlock> {
        self.blocks
    }
}

fn dangling(ptr: RowPointer, block_count: usize) -> JoinError {
    JoinError::corrupt(format!(
        "dangling {ptr:?}: store has {block_count} blocks"
    ))
}
