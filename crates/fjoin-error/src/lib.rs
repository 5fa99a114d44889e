//! Error types shared by every frankenjoin crate.
//!
//! Errors fall into two classes. Contract violations are caller bugs (building
//! into a finalized table, probing before finalize, mismatched chunk shapes)
//! and are reported immediately. Resource exhaustion (partition bit ceiling,
//! block addressing overflow) is fatal for the running join. Neither class is
//! retried inside the engine.

use thiserror::Error;

/// Primary error type for hash-join operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// The caller broke a lifecycle or shape precondition.
    #[error("contract violation: {detail}")]
    ContractViolation { detail: String },

    /// A memory or addressing limit was reached.
    #[error("resource exhausted: {detail}")]
    ResourceExhausted { detail: String },

    /// A value or column did not have the expected logical type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// An index or size argument was outside its valid range.
    #[error("{what} out of range: {value} (limit {limit})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        limit: u64,
    },

    /// Stored row data is inconsistent (dangling pointer, bad heap reference).
    #[error("corrupt row data: {detail}")]
    Corrupt { detail: String },

    /// Internal invariant failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl JoinError {
    /// Build a [`JoinError::ContractViolation`].
    pub fn contract(detail: impl Into<String>) -> Self {
        Self::ContractViolation {
            detail: detail.into(),
        }
    }

    /// Build a [`JoinError::ResourceExhausted`].
    pub fn exhausted(detail: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            detail: detail.into(),
        }
    }

    /// Build a [`JoinError::Corrupt`].
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Build a [`JoinError::Internal`].
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Build a [`JoinError::TypeMismatch`] from anything displayable.
    pub fn type_mismatch(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Whether the error reports caller misuse rather than an engine failure.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation { .. } | Self::TypeMismatch { .. })
    }

    /// Whether the error is fatal for the running join.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. } | Self::Corrupt { .. } | Self::Internal(_)
        )
    }
}

/// Result alias used throughout frankenjoin.
pub type Result<T> = std::result::Result<T, JoinError>;
