//! Error taxonomy for every boundary the supervisor talks across.

use std::time::Duration;

use thiserror::Error;

/// Errors from the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The receipt handle no longer refers to a live delivery: the item was
    /// already deleted, or its visibility expired and another consumer holds it.
    #[error("receipt no longer valid: {0}")]
    ReceiptGone(String),

    #[error("queue call `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("queue transport error: {0}")]
    Transport(String),
}

impl QueueError {
    /// Benign races with another consumer or natural expiry.
    pub fn is_race(&self) -> bool {
        matches!(self, QueueError::ReceiptGone(_))
    }
}

/// Errors returned by the cluster scheduler when placing a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// Not enough CPU or memory anywhere in the cluster right now.
    #[error("cluster out of resources: {0}")]
    ResourceExhausted(String),

    #[error("placement rejected: {0}")]
    Rejected(String),
}

impl PlacementError {
    /// Classify a raw scheduler failure reason. Resource failures are
    /// reported as `RESOURCE:<kind>` (e.g. `RESOURCE:CPU`, `RESOURCE:MEMORY`).
    pub fn from_failure_reason(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if reason.starts_with("RESOURCE:") {
            PlacementError::ResourceExhausted(reason)
        } else {
            PlacementError::Rejected(reason)
        }
    }
}

/// Why a dispatch did not produce a running task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("concurrency limit of {limit} tasks reached")]
    AboveConcurrency { limit: usize },

    #[error("task for message {message_id} not run: {reason}")]
    NotRun { message_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskPollError {
    #[error("task status query failed: {0}")]
    Describe(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification publish failed: {0}")]
    Publish(String),

    #[error("notification publish timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogFetchError {
    #[error("log fetch failed: {0}")]
    Fetch(String),

    #[error("log fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Startup configuration problems. The only fatal error class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// An error caught at a scheduler stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    TaskPoll(#[from] TaskPollError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_reasons_are_exhaustion() {
        assert_eq!(
            PlacementError::from_failure_reason("RESOURCE:MEMORY"),
            PlacementError::ResourceExhausted("RESOURCE:MEMORY".to_string())
        );
        assert_eq!(
            PlacementError::from_failure_reason("AGENT"),
            PlacementError::Rejected("AGENT".to_string())
        );
    }

    #[test]
    fn only_receipt_gone_is_a_race() {
        assert!(QueueError::ReceiptGone("r".into()).is_race());
        assert!(!QueueError::Transport("boom".into()).is_race());
        assert!(
            !QueueError::Timeout {
                op: "delete",
                after: Duration::from_secs(1)
            }
            .is_race()
        );
    }
}
