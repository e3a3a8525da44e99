//! WorkQueue port: the durable queue work items arrive on.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;

/// Most messages a single receive call may return.
pub const MAX_RECEIVE_BATCH: usize = 10;

/// A raw delivery with its receive metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// Epoch millis.
    pub sent_timestamp: i64,
    /// Epoch millis.
    pub first_receive_timestamp: i64,
    pub receive_count: u32,
}

/// Queue operations the supervisor needs.
///
/// Every call addressing a delivery takes its receipt handle. A handle that
/// no longer refers to a live delivery fails with `QueueError::ReceiptGone`.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Long-poll for up to `max` messages, waiting at most `wait`.
    /// Returns an empty vec when nothing arrives in time.
    async fn receive(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Remove the item from the queue.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Hide the item from consumers for `delay` from now.
    async fn change_visibility(
        &self,
        receipt_handle: &str,
        delay: Duration,
    ) -> Result<(), QueueError>;
}
