//! Arena addresses for rows and tagged references into the string heap.

use std::fmt;

use fjoin_error::{JoinError, Result};

// ── Row Pointer ────────────────────────────────────────────────────────────

/// Address of a stored row: block index in the high 32 bits, row index in the low 32.
///
/// `u64::MAX` is the null pointer that terminates a bucket chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowPointer(u64);

impl RowPointer {
    pub const NULL: Self = Self(u64::MAX);

    #[must_use]
    pub const fn new(block: u32, row: u32) -> Self {
        Self(((block as u64) << 32) | row as u64)
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    #[must_use]
    pub const fn block(self) -> usize {
        (self.0 >> 32) as usize
    }

    #[must_use]
    pub const fn row(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }
}

impl Default for RowPointer {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for RowPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("RowPointer(null)")
        } else {
            write!(f, "RowPointer({}:{})", self.block(), self.row())
        }
    }
}

// ── Heap Reference ─────────────────────────────────────────────────────────

/// Bit tag for swizzled heap references.
pub const SWIZZLED_TAG: u64 = 0x1;
const ADDR_SHIFT: u32 = 1;
/// Largest heap block index encodable in a resident reference.
pub const MAX_HEAP_BLOCK: u32 = u32::MAX >> ADDR_SHIFT;
/// Largest offset encodable in a swizzled reference.
pub const MAX_SWIZZLED_OFFSET: u64 = u64::MAX >> ADDR_SHIFT;

/// Where the bytes of a VARCHAR slot live.
///
/// Encoding:
/// - `raw & 1 == 0`: resident, `(block << 32 | offset)` stored as `raw >> 1`
/// - `raw & 1 == 1`: swizzled, offset into the row block's paired heap
///   segment stored as `raw >> 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapRef {
    /// Points into a block of the owning table's [`StringHeap`](crate::StringHeap).
    Resident { block: u32, offset: u32 },
    /// Relocatable offset relative to the paired heap segment.
    Swizzled { offset: u64 },
}

impl HeapRef {
    /// Encode into the tagged on-row word.
    pub fn encode(self) -> Result<u64> {
        match self {
            Self::Resident { block, offset } => {
                if block > MAX_HEAP_BLOCK {
                    return Err(JoinError::OutOfRange {
                        what: "heap block index",
                        value: u64::from(block),
                        limit: u64::from(MAX_HEAP_BLOCK),
                    });
                }
                Ok((((block as u64) << 32) | offset as u64) << ADDR_SHIFT)
            }
            Self::Swizzled { offset } => {
                if offset > MAX_SWIZZLED_OFFSET {
                    return Err(JoinError::OutOfRange {
                        what: "swizzled heap offset",
                        value: offset,
                        limit: MAX_SWIZZLED_OFFSET,
                    });
                }
                Ok((offset << ADDR_SHIFT) | SWIZZLED_TAG)
            }
        }
    }

    #[must_use]
    pub const fn decode(raw: u64) -> Self {
        if raw & SWIZZLED_TAG == SWIZZLED_TAG {
            return Self::Swizzled {
                offset: raw >> ADDR_SHIFT,
            };
        }
        let addr = raw >> ADDR_SHIFT;
        Self::Resident {
            block: (addr >> 32) as u32,
            offset: (addr & 0xFFFF_FFFF) as u32,
        }
    }

    #[must_use]
    pub const fn is_swizzled(self) -> bool {
        matches!(self, Self::Swizzled { .. })
    }
}
