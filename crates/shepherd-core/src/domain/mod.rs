//! Domain model: identifiers, envelopes, outcomes, tasks and reports.

pub mod envelope;
pub mod ids;
pub mod outcome;
pub mod task;

pub use envelope::{EnvVar, Envelope};
pub use ids::{MessageId, TaskRef};
pub use outcome::{ActionSet, Outcome, Requeue};
pub use task::{FinishedTaskReport, ResourceIds, RunningTask};
