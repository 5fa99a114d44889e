//! Logical column types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column types the join engine can store in rows and emit in chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    Int32,
    Int64,
    Float64,
    /// UTF-8 string of arbitrary length.
    Varchar,
}

impl LogicalType {
    /// Stable label used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float64 => "FLOAT64",
            Self::Varchar => "VARCHAR",
        }
    }

    /// Whether values of this type spill into a string heap when stored in rows.
    #[must_use]
    pub const fn is_variable_length(self) -> bool {
        matches!(self, Self::Varchar)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
