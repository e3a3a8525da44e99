//! Running tasks and the reports produced when they finish.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::envelope::Envelope;
use super::ids::{MessageId, TaskRef};
use super::outcome::Outcome;

/// Where a task ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIds {
    pub cluster: String,
    /// Known once the scheduler has placed the task on an instance.
    pub container_instance: Option<String>,
    pub task: String,
}

impl fmt::Display for ResourceIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster={} instance={} task={}",
            self.cluster,
            self.container_instance.as_deref().unwrap_or("-"),
            self.task
        )
    }
}

/// A task that has been started and not yet observed as stopped.
#[derive(Debug, Clone)]
pub struct RunningTask {
    pub task_ref: TaskRef,
    pub resources: ResourceIds,
    pub envelope: Envelope,
    pub dispatched_at: DateTime<Utc>,
}

impl RunningTask {
    pub fn message_id(&self) -> &MessageId {
        &self.envelope.message_id
    }
}

/// The result of one task, consumed exactly once by the queue client.
#[derive(Debug, Clone)]
pub struct FinishedTaskReport {
    pub outcome: Outcome,
    pub stop_reason: String,
    pub duration: Duration,
    pub resources: ResourceIds,
    pub envelope: Envelope,
}

impl FinishedTaskReport {
    pub fn message_id(&self) -> &MessageId {
        &self.envelope.message_id
    }

    pub fn receive_count(&self) -> u32 {
        self.envelope.receive_count
    }

    /// A report for an envelope that never got a task.
    pub fn unplaced(envelope: Envelope, outcome: Outcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            stop_reason: reason.into(),
            duration: Duration::ZERO,
            resources: ResourceIds::default(),
            envelope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ids_display_placeholder_for_unknown_instance() {
        let ids = ResourceIds {
            cluster: "c".into(),
            container_instance: None,
            task: "t".into(),
        };
        assert_eq!(ids.to_string(), "cluster=c instance=- task=t");
    }
}
