//! Cursor shared by the workers scanning one hash table.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Position of a scan over the rows of a [`crate::JoinHashTable`].
///
/// Two access patterns share this state:
///
/// * a single owner walks the table sequentially through `block_position` /
///   `position` (see [`crate::JoinHashTable::scan_full_outer`]), and
/// * parallel workers claim disjoint row ranges by bumping the atomic
///   `scanned` counter through [`JoinHTScanState::claim`], which needs only a
///   shared reference.
#[derive(Debug, Default)]
pub struct JoinHTScanState {
    /// Next row inside `block_position` for the sequential cursor.
    pub position: usize,
    /// Block the sequential cursor is in.
    pub block_position: usize,
    /// Rows in the table being scanned.
    pub total: usize,
    /// Rows the sequential cursor has stepped over.
    pub scan_index: usize,
    scanned: AtomicUsize,
}

impl JoinHTScanState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind to the first row and forget `total`.
    pub fn reset(&mut self) {
        self.position = 0;
        self.block_position = 0;
        self.total = 0;
        self.scan_index = 0;
        *self.scanned.get_mut() = 0;
    }

    /// Claim up to `max_rows` unscanned rows. `None` once all `total` rows are handed out.
    pub fn claim(&self, max_rows: usize) -> Option<Range<usize>> {
        let step = max_rows.max(1);
        let start = self.scanned.fetch_add(step, Ordering::AcqRel);
        if start >= self.total {
            return None;
        }
        Some(start..(start + step).min(self.total))
    }

    /// Rows handed out so far, saturated at `total`.
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.scanned.load(Ordering::Acquire).min(self.total)
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.scanned() >= self.total
    }
}
