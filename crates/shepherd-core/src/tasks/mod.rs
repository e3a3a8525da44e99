//! Task side of the supervisor: dispatching tasks under a concurrency
//! ceiling and collecting the ones that finished.

mod index;
mod supervisor;

pub use index::TaskIndex;
pub use supervisor::{
    DispatchBatch, MISSING_FROM_CLUSTER, PlacementTemplate, TaskPoll, TaskSupervisor,
};
