//! Impls: in-memory adapters for every port.
//!
//! Used by the test suite and by the CLI's local mode. Production adapters
//! for a real queue, scheduler and alert channel implement the same traits.

pub mod inmem_cluster;
pub mod inmem_logs;
pub mod inmem_queue;
pub mod recording_notifier;

pub use self::inmem_cluster::{ExitSource, InMemoryCluster, TaskPlan};
pub use self::inmem_logs::InMemoryLogs;
pub use self::inmem_queue::{InMemoryWorkQueue, QueueCall};
pub use self::recording_notifier::{RecordingNotifier, SentAlert};
