//! Row-wise storage for hash-join build sides.
//!
//! Build rows are serialized into fixed-width entries ([`RowLayout`]) stored in
//! append-only blocks ([`RowBlockStore`]). Variable-length data lives in a
//! [`StringHeap`]. Rows are addressed by [`RowPointer`] (block index plus row
//! index) rather than by memory address, and every dereference is bounds
//! checked. [`swizzle`] turns a collection into a relocatable form that can be
//! radix partitioned and moved between tables.

pub mod block;
pub mod heap;
pub mod layout;
pub mod pointer;
pub mod row;
pub mod swizzle;

pub use block::{BlockHandle, RowBlock, RowBlockStore};
pub use heap::StringHeap;
pub use layout::RowLayout;
pub use pointer::{HeapRef, RowPointer};
pub use swizzle::{SwizzledRows, partition_of};
