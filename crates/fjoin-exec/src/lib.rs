//! Hash-join execution.
//!
//! [`JoinHashTable`] stores the build side of an equi-join and answers
//! probes through [`ScanStructure`]s. Worker-local tables are combined with
//! [`JoinHashTable::merge`], or, when the build side exceeds its memory
//! budget, radix partitioned through [`TaskScheduler`] and processed in
//! external rounds.

pub mod config;
pub mod correlated;
pub mod instrumentation;
pub mod join_hashtable;
pub mod scan;
pub mod scan_state;
pub mod scheduler;

pub use config::JoinConfig;
pub use correlated::{CorrelatedMarkJoinInfo, GroupCounts};
pub use instrumentation::{JoinMetricsSnapshot, join_metrics_snapshot, reset_join_metrics};
pub use join_hashtable::{JoinHashTable, ProbeAndBuild};
pub use scan::ScanStructure;
pub use scan_state::JoinHTScanState;
pub use scheduler::{CompletionEvent, TaskScheduler};
