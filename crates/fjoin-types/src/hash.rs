//! Fixed-seed hashing of join keys.
//!
//! Build and probe must agree bit for bit, and partition rounds read hashes
//! that were stored at build time, so the seed and the per-type byte encoding
//! are part of the on-row format.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::value::{ValueRef, canonical_f64};
use crate::vector::{SelectionVector, Vector};

/// Seed for every key hash.
pub const JOIN_HASH_SEED: u64 = 0x9E37_79B9_7F4A_7C15;
/// Hash assigned to NULL keys.
pub const NULL_HASH: u64 = 0xBF58_476D_1CE4_E5B9;
const COMBINE_MULTIPLIER: u64 = 0x94D0_49BB_1331_11EB;

/// Hash a single value.
#[must_use]
pub fn hash_value(value: ValueRef<'_>) -> u64 {
    match value {
        ValueRef::Null => NULL_HASH,
        ValueRef::Boolean(v) => xxh3_64_with_seed(&[u8::from(v)], JOIN_HASH_SEED),
        ValueRef::Int32(v) => xxh3_64_with_seed(&i64::from(v).to_le_bytes(), JOIN_HASH_SEED),
        ValueRef::Int64(v) => xxh3_64_with_seed(&v.to_le_bytes(), JOIN_HASH_SEED),
        ValueRef::Float64(v) => {
            xxh3_64_with_seed(&canonical_f64(v).to_bits().to_le_bytes(), JOIN_HASH_SEED)
        }
        ValueRef::Varchar(v) => xxh3_64_with_seed(v.as_bytes(), JOIN_HASH_SEED),
    }
}

/// Fold the hash of the next key column into an accumulated hash.
#[must_use]
pub const fn combine_hashes(acc: u64, next: u64) -> u64 {
    acc.wrapping_mul(COMBINE_MULTIPLIER).rotate_left(31) ^ next
}

/// Hash the selected rows of `columns`; the result is aligned with `sel`.
#[must_use]
pub fn hash_columns(columns: &[Vector], sel: &SelectionVector) -> Vec<u64> {
    sel.iter()
        .map(|row| {
            let mut iter = columns.iter();
            let first = iter.next().map_or(NULL_HASH, |c| hash_value(c.value_ref(row)));
            iter.fold(first, |acc, c| combine_hashes(acc, hash_value(c.value_ref(row))))
        })
        .collect()
}
