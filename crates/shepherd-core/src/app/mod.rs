//! App: the scheduler loop and its wiring.
//!
//! - **SupervisorBuilder**: validates config and wires ports
//! - **SchedulerLoop**: poll tasks, resolve, poll queue, dispatch
//! - **SupervisorHandle**: runs the loop on a task with a shutdown signal
//! - **status**: counts and summaries

pub mod builder;
pub mod handle;
pub mod scheduler_loop;
pub mod status;

pub use self::builder::{BuildError, SupervisorBuilder};
pub use self::handle::SupervisorHandle;
pub use self::scheduler_loop::{SchedulerLoop, Stage};
pub use self::status::{CycleReport, RunSummary, SupervisorCounts};
