//! Tunables for hash-join execution.

use fjoin_error::{JoinError, Result};
use serde::{Deserialize, Serialize};

/// Rows per emitted vector.
pub const DEFAULT_VECTOR_SIZE: usize = 2048;
/// Radix bits are never raised beyond this, even when repartitioning.
pub const MAX_RADIX_BITS: u32 = 12;

/// Configuration shared by every table taking part in one join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Target fill ratio of the hash directory; capacity is at least `count / load_factor`.
    pub load_factor: f64,
    /// Smallest directory ever allocated (rounded up to a power of two).
    pub min_directory_capacity: usize,
    /// Row entries per block of the row store.
    pub rows_per_block: usize,
    /// Bytes per string heap block.
    pub heap_block_size: usize,
    /// Upper bound on rows produced by full-outer scans and probe-tuple gathers.
    pub vector_size: usize,
    /// Radix bits tried first when partitioning an external join.
    pub initial_radix_bits: u32,
    /// Ceiling for the radix bits picked up front.
    pub max_initial_radix_bits: u32,
    /// Ceiling for recursive repartitioning of oversized partitions.
    pub max_radix_bits: u32,
    /// Partitions a probe round should hold on average.
    pub partitions_per_round_target: usize,
    /// Split an external join into at least three rounds regardless of size.
    pub force_external: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            load_factor: 0.5,
            min_directory_capacity: 1024,
            rows_per_block: 2048,
            heap_block_size: 256 * 1024,
            vector_size: DEFAULT_VECTOR_SIZE,
            initial_radix_bits: 4,
            max_initial_radix_bits: 8,
            max_radix_bits: MAX_RADIX_BITS,
            partitions_per_round_target: 8,
            force_external: false,
        }
    }
}

impl JoinConfig {
    /// Reject configurations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !(self.load_factor > 0.0 && self.load_factor <= 1.0) {
            return Err(JoinError::contract(format!(
                "load_factor must be in (0, 1], got {}",
                self.load_factor
            )));
        }
        if self.rows_per_block == 0 || self.vector_size == 0 || self.heap_block_size == 0 {
            return Err(JoinError::contract(
                "rows_per_block, vector_size and heap_block_size must be positive",
            ));
        }
        if self.max_radix_bits > MAX_RADIX_BITS {
            return Err(JoinError::OutOfRange {
                what: "max_radix_bits",
                value: u64::from(self.max_radix_bits),
                limit: u64::from(MAX_RADIX_BITS),
            });
        }
        if self.initial_radix_bits > self.max_initial_radix_bits
            || self.max_initial_radix_bits > self.max_radix_bits
        {
            return Err(JoinError::contract(format!(
                "radix bits must satisfy initial ({}) <= max_initial ({}) <= max ({})",
                self.initial_radix_bits, self.max_initial_radix_bits, self.max_radix_bits
            )));
        }
        if self.partitions_per_round_target == 0 {
            return Err(JoinError::contract("partitions_per_round_target must be positive"));
        }
        Ok(())
    }

    /// Directory capacity for `count` rows: a power of two honouring the load factor.
    #[must_use]
    pub fn directory_capacity(&self, count: usize) -> usize {
        let wanted = (count as f64 / self.load_factor).ceil() as usize;
        wanted
            .max(self.min_directory_capacity)
            .max(1)
            .next_power_of_two()
    }
}
