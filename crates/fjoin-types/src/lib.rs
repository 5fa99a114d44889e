//! Core value types for the frankenjoin hash-join engine.
//!
//! Columnar batches ([`DataChunk`]) of typed [`Vector`]s flow into and out of
//! the join operators. [`JoinCondition`] and [`JoinType`] describe what a join
//! computes; [`hash`] fixes the hashing scheme shared by build and probe.

pub mod chunk;
pub mod hash;
pub mod join;
pub mod logical_type;
pub mod value;
pub mod vector;

pub use chunk::DataChunk;
pub use join::{ComparisonKind, JoinCondition, JoinType};
pub use logical_type::LogicalType;
pub use value::{Value, ValueRef};
pub use vector::{ColumnData, NullBitmap, SelectionVector, Vector, VectorBuilder};
