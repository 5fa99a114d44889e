//! Owned and borrowed scalar values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::logical_type::LogicalType;

/// Owned scalar value, used at API edges and in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Varchar(String),
}

/// Borrowed scalar value read out of a vector or a stored row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Varchar(&'a str),
}

impl Value {
    #[must_use]
    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Self::Null => ValueRef::Null,
            Self::Boolean(v) => ValueRef::Boolean(*v),
            Self::Int32(v) => ValueRef::Int32(*v),
            Self::Int64(v) => ValueRef::Int64(*v),
            Self::Float64(v) => ValueRef::Float64(*v),
            Self::Varchar(v) => ValueRef::Varchar(v),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Logical type of a non-NULL value.
    #[must_use]
    pub fn logical_type(&self) -> Option<LogicalType> {
        self.as_value_ref().logical_type()
    }
}

impl<'a> ValueRef<'a> {
    #[must_use]
    pub const fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn logical_type(self) -> Option<LogicalType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(LogicalType::Boolean),
            Self::Int32(_) => Some(LogicalType::Int32),
            Self::Int64(_) => Some(LogicalType::Int64),
            Self::Float64(_) => Some(LogicalType::Float64),
            Self::Varchar(_) => Some(LogicalType::Varchar),
        }
    }

    #[must_use]
    pub fn to_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(v) => Value::Boolean(v),
            Self::Int32(v) => Value::Int32(v),
            Self::Int64(v) => Value::Int64(v),
            Self::Float64(v) => Value::Float64(v),
            Self::Varchar(v) => Value::Varchar(v.to_owned()),
        }
    }

    /// Total order between two non-NULL values of the same type.
    ///
    /// Returns `None` when either side is NULL or the types differ. Floats
    /// compare with `-0.0 == 0.0` and all NaNs equal to each other.
    #[must_use]
    pub fn compare(self, other: ValueRef<'_>) -> Option<Ordering> {
        match (self, other) {
            (Self::Boolean(a), ValueRef::Boolean(b)) => Some(a.cmp(&b)),
            (Self::Int32(a), ValueRef::Int32(b)) => Some(a.cmp(&b)),
            (Self::Int64(a), ValueRef::Int64(b)) => Some(a.cmp(&b)),
            (Self::Float64(a), ValueRef::Float64(b)) => {
                Some(canonical_f64(a).total_cmp(&canonical_f64(b)))
            }
            (Self::Varchar(a), ValueRef::Varchar(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Collapse `-0.0` onto `0.0` and every NaN payload onto one NaN.
#[must_use]
pub fn canonical_f64(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Varchar(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Varchar(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Varchar(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
