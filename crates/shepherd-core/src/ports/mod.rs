//! Ports: the external systems the supervisor talks to.
//!
//! Each trait hides one collaborator (queue, cluster scheduler, alert
//! channel, log store) so the loop can run against real services or the
//! in-memory adapters in `impls`.

pub mod clock;
pub mod cluster;
pub mod id_generator;
pub mod log_fetcher;
pub mod notifier;
pub mod work_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cluster::{
    Cluster, ContainerExit, DESCRIBE_BATCH, PlacedTask, PlacementRequest, TaskDescription,
    TaskLifecycle, TaskStatusBatch,
};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::log_fetcher::LogFetcher;
pub use self::notifier::Notifier;
pub use self::work_queue::{MAX_RECEIVE_BATCH, ReceivedMessage, WorkQueue};
