//! Hash-join observability counters.
//!
//! Lightweight process-local counters. Tests that assert on them must
//! compare deltas, since other tests in the same process also bump them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of hash-join metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JoinMetricsSnapshot {
    /// Rows stored by `build`.
    pub fjoin_build_rows_total: u64,
    /// Build rows skipped because of NULL keys.
    pub fjoin_build_null_rows_total: u64,
    /// Probe rows handed to `probe` / `probe_and_build`.
    pub fjoin_probe_rows_total: u64,
    /// Chain pointers followed while resolving predicates.
    pub fjoin_chain_steps_total: u64,
    /// Key matches found.
    pub fjoin_matches_total: u64,
    /// Completed `finalize` calls.
    pub fjoin_finalize_total: u64,
    /// Rows moved into swizzled form.
    pub fjoin_swizzle_out_rows_total: u64,
    /// Rows moved back into resident form.
    pub fjoin_swizzle_in_rows_total: u64,
    /// Partition tasks executed.
    pub fjoin_partition_tasks_total: u64,
    /// External rounds started by `finalize_external`.
    pub fjoin_external_rounds_total: u64,
    /// Times the partition set gained a radix bit.
    pub fjoin_repartitions_total: u64,
}

static BUILD_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static BUILD_NULL_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static PROBE_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static CHAIN_STEPS_TOTAL: AtomicU64 = AtomicU64::new(0);
static MATCHES_TOTAL: AtomicU64 = AtomicU64::new(0);
static FINALIZE_TOTAL: AtomicU64 = AtomicU64::new(0);
static SWIZZLE_OUT_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static SWIZZLE_IN_ROWS_TOTAL: AtomicU64 = AtomicU64::new(0);
static PARTITION_TASKS_TOTAL: AtomicU64 = AtomicU64::new(0);
static EXTERNAL_ROUNDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static REPARTITIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

fn add(counter: &AtomicU64, n: usize) {
    counter.fetch_add(u64::try_from(n).unwrap_or(u64::MAX), Ordering::Relaxed);
}

pub(crate) fn record_build_rows(stored: usize, skipped: usize) {
    add(&BUILD_ROWS_TOTAL, stored);
    add(&BUILD_NULL_ROWS_TOTAL, skipped);
}

pub(crate) fn record_probe_rows(rows: usize) {
    add(&PROBE_ROWS_TOTAL, rows);
}

pub(crate) fn record_chain_steps(steps: usize, matches: usize) {
    add(&CHAIN_STEPS_TOTAL, steps);
    add(&MATCHES_TOTAL, matches);
}

pub(crate) fn record_finalize() {
    FINALIZE_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_swizzle_out(rows: usize) {
    add(&SWIZZLE_OUT_ROWS_TOTAL, rows);
}

pub(crate) fn record_swizzle_in(rows: usize) {
    add(&SWIZZLE_IN_ROWS_TOTAL, rows);
}

pub(crate) fn record_partition_task() {
    PARTITION_TASKS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_external_round() {
    EXTERNAL_ROUNDS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_repartition() {
    REPARTITIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Read a point-in-time snapshot of every counter.
#[must_use]
pub fn join_metrics_snapshot() -> JoinMetricsSnapshot {
    JoinMetricsSnapshot {
        fjoin_build_rows_total: BUILD_ROWS_TOTAL.load(Ordering::Relaxed),
        fjoin_build_null_rows_total: BUILD_NULL_ROWS_TOTAL.load(Ordering::Relaxed),
        fjoin_probe_rows_total: PROBE_ROWS_TOTAL.load(Ordering::Relaxed),
        fjoin_chain_steps_total: CHAIN_STEPS_TOTAL.load(Ordering::Relaxed),
        fjoin_matches_total: MATCHES_TOTAL.load(Ordering::Relaxed),
        fjoin_finalize_total: FINALIZE_TOTAL.load(Ordering::Relaxed),
        fjoin_swizzle_out_rows_total: SWIZZLE_OUT_ROWS_TOTAL.load(Ordering::Relaxed),
        fjoin_swizzle_in_rows_total: SWIZZLE_IN_ROWS_TOTAL.load(Ordering::Relaxed),
        fjoin_partition_tasks_total: PARTITION_TASKS_TOTAL.load(Ordering::Relaxed),
        fjoin_external_rounds_total: EXTERNAL_ROUNDS_TOTAL.load(Ordering::Relaxed),
        fjoin_repartitions_total: REPARTITIONS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset every counter to zero.
pub fn reset_join_metrics() {
    for counter in [
        &BUILD_ROWS_TOTAL,
        &BUILD_NULL_ROWS_TOTAL,
        &PROBE_ROWS_TOTAL,
        &CHAIN_STEPS_TOTAL,
        &MATCHES_TOTAL,
        &FINALIZE_TOTAL,
        &SWIZZLE_OUT_ROWS_TOTAL,
        &SWIZZLE_IN_ROWS_TOTAL,
        &PARTITION_TASKS_TOTAL,
        &EXTERNAL_ROUNDS_TOTAL,
        &REPARTITIONS_TOTAL,
    ] {
        counter.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = join_metrics_snapshot();
        record_build_rows(5, 2);
        record_chain_steps(7, 3);
        record_finalize();
        let after = join_metrics_snapshot();
        assert!(after.fjoin_build_rows_total >= before.fjoin_build_rows_total + 5);
        assert!(after.fjoin_build_null_rows_total >= before.fjoin_build_null_rows_total + 2);
        assert!(after.fjoin_chain_steps_total >= before.fjoin_chain_steps_total + 7);
        assert!(after.fjoin_matches_total >= before.fjoin_matches_total + 3);
        assert!(after.fjoin_finalize_total > before.fjoin_finalize_total);
    }

    #[test]
    fn snapshot_serializes_with_metric_names() {
        let json = serde_json::to_string(&join_metrics_snapshot()).expect("serialize snapshot");
        assert!(json.contains("\"fjoin_probe_rows_total\""));
        assert!(json.contains("\"fjoin_repartitions_total\""));
    }
}
