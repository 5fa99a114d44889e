//! Heap blocks holding the bytes of variable-length row values.

use fjoin_error::{JoinError, Result};

use crate::pointer::{HeapRef, MAX_HEAP_BLOCK};

/// Append-only byte arena for VARCHAR data. Released together with the rows.
#[derive(Debug, Clone)]
pub struct StringHeap {
    blocks: Vec<Vec<u8>>,
    block_size: usize,
}

impl StringHeap {
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.clamp(1, u32::MAX as usize),
        }
    }

    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(self.block_size)
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Copy `bytes` into the heap and return a resident reference to them.
    pub fn append(&mut self, bytes: &[u8]) -> Result<HeapRef> {
        if u32::try_from(bytes.len()).is_err() {
            return Err(JoinError::OutOfRange {
                what: "heap value length",
                value: bytes.len() as u64,
                limit: u64::from(u32::MAX),
            });
        }
        let fits = self
            .blocks
            .last()
            .is_some_and(|block| block.len() + bytes.len() <= self.block_size);
        if !fits {
            self.open_block(bytes.len())?;
        }
        let block_idx = self.blocks.len() - 1;
        let block = &mut self.blocks[block_idx];
        let offset = u32::try_from(block.len()).map_err(|_| {
            JoinError::exhausted(format!("heap block {block_idx} exceeds 4 GiB"))
        })?;
        block.extend_from_slice(bytes);
        Ok(HeapRef::Resident {
            block: block_idx as u32,
            offset,
        })
    }

    fn open_block(&mut self, min_len: usize) -> Result<()> {
        if self.blocks.len() > MAX_HEAP_BLOCK as usize {
            return Err(JoinError::exhausted("heap block index space exhausted"));
        }
        self.blocks
            .push(Vec::with_capacity(self.block_size.max(min_len)));
        Ok(())
    }

    /// Bounds-checked read of `len` bytes at `(block, offset)`.
    pub fn get(&self, block: u32, offset: u32, len: u32) -> Result<&[u8]> {
        let data = self.block(block)?;
        let start = offset as usize;
        let end = start + len as usize;
        data.get(start..end).ok_or_else(|| {
            JoinError::corrupt(format!(
                "heap range {start}..{end} beyond block {block} of {} bytes",
                data.len()
            ))
        })
    }

    pub fn block(&self, block: u32) -> Result<&[u8]> {
        self.blocks
            .get(block as usize)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                JoinError::corrupt(format!(
                    "heap block {block} beyond heap of {} blocks",
                    self.blocks.len()
                ))
            })
    }

    /// Adopt an externally built block. Returns its index.
    pub fn push_block(&mut self, block: Vec<u8>) -> Result<u32> {
        if self.blocks.len() > MAX_HEAP_BLOCK as usize {
            return Err(JoinError::exhausted("heap block index space exhausted"));
        }
        self.blocks.push(block);
        Ok((self.blocks.len() - 1) as u32)
    }

    /// Move `other`'s blocks to the end of this heap. Returns the index of the first moved block.
    pub fn merge(&mut self, other: Self) -> Result<u32> {
        let base = self.blocks.len();
        if base + other.blocks.len() > MAX_HEAP_BLOCK as usize + 1 {
            return Err(JoinError::exhausted("heap block index space exhausted"));
        }
        self.blocks.extend(other.blocks);
        Ok(base as u32)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    #[must_use]
    pub fn take(&mut self) -> Self {
        let empty = self.empty_like();
        std::mem::replace(self, empty)
    }
}
