//! Join semantics: join types, comparison kinds and join conditions.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::logical_type::LogicalType;
use crate::value::ValueRef;

// ── Join Type ──────────────────────────────────────────────────────────────

/// Supported join variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    /// Emit only matching pairs.
    Inner,
    /// Emit all probe rows; NULL-pad build columns on miss.
    Left,
    /// Emit matching pairs, then every unmatched build row with NULL probe columns.
    Right,
    /// Full outer join: `Left` on the probe side plus `Right` on the build side.
    Outer,
    /// Emit probe rows that have at least one build match, once each.
    Semi,
    /// Emit probe rows with no build match.
    Anti,
    /// Emit every probe row with a three-valued "has match" column.
    Mark,
    /// Emit every probe row with at most one matching build row.
    Single,
}

impl JoinType {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
            Self::Semi => "semi",
            Self::Anti => "anti",
            Self::Mark => "mark",
            Self::Single => "single",
        }
    }

    /// Build rows carry a found flag and unmatched ones are emitted after probing.
    #[must_use]
    pub const fn is_right_outer(self) -> bool {
        matches!(self, Self::Right | Self::Outer)
    }

    /// Probe rows need a per-row match flag while scanning.
    #[must_use]
    pub const fn tracks_probe_matches(self) -> bool {
        !matches!(self, Self::Inner | Self::Right)
    }

    /// Output rows include the build payload columns.
    #[must_use]
    pub const fn emits_build_columns(self) -> bool {
        !matches!(self, Self::Semi | Self::Anti | Self::Mark)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Comparison ─────────────────────────────────────────────────────────────

/// Comparison applied between a probe key and a build key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonKind {
    Equal,
    /// `IS NOT DISTINCT FROM`: equality where NULL equals NULL.
    NotDistinctFrom,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonKind {
    /// Equality kinds are hashed and select the bucket.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::NotDistinctFrom)
    }

    /// Whether `probe.cmp(build) == ordering` satisfies the comparison.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal | Self::NotDistinctFrom => matches!(ordering, Ordering::Equal),
            Self::NotEqual => !matches!(ordering, Ordering::Equal),
            Self::LessThan => matches!(ordering, Ordering::Less),
            Self::LessThanOrEqual => !matches!(ordering, Ordering::Greater),
            Self::GreaterThan => matches!(ordering, Ordering::Greater),
            Self::GreaterThanOrEqual => !matches!(ordering, Ordering::Less),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotDistinctFrom => "IS NOT DISTINCT FROM",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

// ── Join Condition ─────────────────────────────────────────────────────────

/// One `probe_key <op> build_key` term of the join predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinCondition {
    comparison: ComparisonKind,
    key_type: LogicalType,
    null_values_are_equal: bool,
}

impl JoinCondition {
    #[must_use]
    pub const fn new(comparison: ComparisonKind, key_type: LogicalType) -> Self {
        Self {
            comparison,
            key_type,
            null_values_are_equal: matches!(comparison, ComparisonKind::NotDistinctFrom),
        }
    }

    /// Plain `=` on `key_type`.
    #[must_use]
    pub const fn equal(key_type: LogicalType) -> Self {
        Self::new(ComparisonKind::Equal, key_type)
    }

    /// Override NULL comparability. `NotDistinctFrom` always keeps it.
    #[must_use]
    pub const fn with_null_equality(mut self, null_values_are_equal: bool) -> Self {
        self.null_values_are_equal = null_values_are_equal
            || matches!(self.comparison, ComparisonKind::NotDistinctFrom);
        self
    }

    #[must_use]
    pub const fn comparison(&self) -> ComparisonKind {
        self.comparison
    }

    #[must_use]
    pub const fn key_type(&self) -> LogicalType {
        self.key_type
    }

    #[must_use]
    pub const fn null_values_are_equal(&self) -> bool {
        self.null_values_are_equal
    }

    #[must_use]
    pub const fn is_equality(&self) -> bool {
        self.comparison.is_equality()
    }

    /// Evaluate `probe <op> build` under this condition's NULL semantics.
    #[must_use]
    pub fn matches(&self, probe: ValueRef<'_>, build: ValueRef<'_>) -> bool {
        match (probe.is_null(), build.is_null()) {
            (false, false) => probe
                .compare(build)
                .is_some_and(|ordering| self.comparison.accepts(ordering)),
            (true, true) => self.null_values_are_equal && self.comparison.is_equality(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_conditions_reject_nulls_by_default() {
        let cond = JoinCondition::equal(LogicalType::Int64);
        assert!(cond.matches(ValueRef::Int64(1), ValueRef::Int64(1)));
        assert!(!cond.matches(ValueRef::Null, ValueRef::Null));
        assert!(!cond.matches(ValueRef::Null, ValueRef::Int64(1)));
    }

    #[test]
    fn not_distinct_from_matches_nulls() {
        let cond = JoinCondition::new(ComparisonKind::NotDistinctFrom, LogicalType::Varchar);
        assert!(cond.null_values_are_equal());
        assert!(cond.matches(ValueRef::Null, ValueRef::Null));
        assert!(!cond.matches(ValueRef::Null, ValueRef::Varchar("x")));
        assert!(
            cond.with_null_equality(false).null_values_are_equal(),
            "NOT DISTINCT FROM keeps NULL equality"
        );
    }

    #[test]
    fn inequalities_compare_probe_against_build() {
        let lt = JoinCondition::new(ComparisonKind::LessThan, LogicalType::Int32);
        assert!(lt.matches(ValueRef::Int32(1), ValueRef::Int32(2)));
        assert!(!lt.matches(ValueRef::Int32(2), ValueRef::Int32(2)));
        let ne = JoinCondition::new(ComparisonKind::NotEqual, LogicalType::Int32);
        assert!(ne.matches(ValueRef::Int32(1), ValueRef::Int32(2)));
        assert!(!ne.matches(ValueRef::Null, ValueRef::Int32(2)));
    }

    #[test]
    fn join_type_classification() {
        assert!(JoinType::Right.is_right_outer());
        assert!(JoinType::Outer.is_right_outer());
        assert!(!JoinType::Left.is_right_outer());
        assert!(!JoinType::Inner.tracks_probe_matches());
        assert!(JoinType::Single.tracks_probe_matches());
        assert!(!JoinType::Mark.emits_build_columns());
        assert!(JoinType::Single.emits_build_columns());
    }
}
