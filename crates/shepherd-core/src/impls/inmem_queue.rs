//! InMemoryWorkQueue: a local queue with visibility timeouts.
//!
//! Each receive hands out a fresh receipt handle and hides the message for the
//! visibility timeout. Only the newest receipt of a message is honoured, so a
//! stale handle gets `QueueError::ReceiptGone` just like a real queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::error::QueueError;
use crate::ports::{Clock, IdGenerator, ReceivedMessage, SystemClock, UlidGenerator, WorkQueue};

/// A call observed by the queue, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCall {
    Receive { max: usize },
    Delete { message_id: String },
    ChangeVisibility { message_id: String, delay: Duration },
    /// A delete or visibility change with a receipt that is not current.
    Rejected { op: &'static str, receipt_handle: String },
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    sent_timestamp: i64,
    first_receive_timestamp: Option<i64>,
    receive_count: u32,
    visible_at: Instant,
    receipt: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    calls: Vec<QueueCall>,
    fail_next: Option<QueueError>,
}

impl QueueState {
    fn position_of_receipt(&self, receipt_handle: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt_handle))
    }
}

pub struct InMemoryWorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    visibility_timeout: Duration,
}

impl InMemoryWorkQueue {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            clock,
            ids,
            visibility_timeout: Duration::from_secs(30),
        }
    }

    /// Wall clock and ULID ids.
    pub fn local() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        Self::new(clock, ids)
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Enqueue a message and return its id.
    pub async fn send(&self, body: impl Into<String>) -> String {
        let message_id = self.ids.message_id();
        let message = StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            sent_timestamp: self.clock.now().timestamp_millis(),
            first_receive_timestamp: None,
            receive_count: 0,
            visible_at: Instant::now(),
            receipt: None,
        };
        self.state.lock().await.messages.push_back(message);
        self.notify.notify_one();
        message_id
    }

    /// Messages still on the queue, visible or not.
    pub async fn depth(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn calls(&self) -> Vec<QueueCall> {
        self.state.lock().await.calls.clone()
    }

    /// Make the next call of any kind fail with `error`.
    pub async fn fail_next(&self, error: QueueError) {
        self.state.lock().await.fail_next = Some(error);
    }

    pub async fn current_receipt(&self, message_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .and_then(|m| m.receipt.clone())
    }

    pub async fn receive_count(&self, message_id: &str) -> Option<u32> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| m.receive_count)
    }

    /// Hand out up to `max` visible messages; the earliest time anything
    /// becomes visible when nothing is.
    fn take_visible(
        &self,
        state: &mut QueueState,
        max: usize,
    ) -> Result<Vec<ReceivedMessage>, Option<Instant>> {
        let now = Instant::now();
        let mut out = Vec::new();
        for message in state.messages.iter_mut() {
            if out.len() == max {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            let receipt = self.ids.receipt_handle();
            message.receive_count += 1;
            let first = *message
                .first_receive_timestamp
                .get_or_insert_with(|| self.clock.now().timestamp_millis());
            message.visible_at = now + self.visibility_timeout;
            message.receipt = Some(receipt.clone());
            out.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: receipt,
                body: message.body.clone(),
                sent_timestamp: message.sent_timestamp,
                first_receive_timestamp: first,
                receive_count: message.receive_count,
            });
        }

        if out.is_empty() {
            Err(state.messages.iter().map(|m| m.visible_at).min())
        } else {
            Ok(out)
        }
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn receive(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + wait;
        {
            let mut state = self.state.lock().await;
            state.calls.push(QueueCall::Receive { max });
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
        }

        loop {
            let next_visible = {
                let mut state = self.state.lock().await;
                match self.take_visible(&mut state, max) {
                    Ok(batch) => return Ok(batch),
                    Err(next_visible) => next_visible,
                }
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let wake = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(wake) => {},
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        let Some(pos) = state.position_of_receipt(receipt_handle) else {
            state.calls.push(QueueCall::Rejected {
                op: "delete",
                receipt_handle: receipt_handle.to_string(),
            });
            return Err(QueueError::ReceiptGone(receipt_handle.to_string()));
        };
        if let Some(message) = state.messages.remove(pos) {
            state.calls.push(QueueCall::Delete {
                message_id: message.message_id,
            });
        }
        Ok(())
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        let Some(pos) = state.position_of_receipt(receipt_handle) else {
            state.calls.push(QueueCall::Rejected {
                op: "change_visibility",
                receipt_handle: receipt_handle.to_string(),
            });
            return Err(QueueError::ReceiptGone(receipt_handle.to_string()));
        };
        let message = &mut state.messages[pos];
        message.visible_at = Instant::now() + delay;
        let message_id = message.message_id.clone();
        state
            .calls
            .push(QueueCall::ChangeVisibility { message_id, delay });
        drop(state);

        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_hides_message_for_visibility_timeout() {
        let queue = InMemoryWorkQueue::local();
        queue.send("a").await;

        let first = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);

        let second = queue.receive(10, Duration::ZERO).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn message_returns_after_visibility_change() {
        let queue = InMemoryWorkQueue::local();
        queue.send("a").await;
        let first = queue.receive(1, Duration::ZERO).await.unwrap();

        queue
            .change_visibility(&first[0].receipt_handle, Duration::from_secs(4))
            .await
            .unwrap();

        let again = queue.receive(1, Duration::from_secs(20)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);
        assert_eq!(queue.receive_count(&again[0].message_id).await, Some(2));
        assert_eq!(again[0].first_receive_timestamp, first[0].first_receive_timestamp);
        assert_ne!(again[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_receive_waits_out_the_poll() {
        let queue = InMemoryWorkQueue::local();
        let start = Instant::now();
        let got = queue.receive(10, Duration::from_secs(20)).await.unwrap();
        assert!(got.is_empty());
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn stale_receipt_is_gone() {
        let queue = InMemoryWorkQueue::local().with_visibility_timeout(Duration::ZERO);
        queue.send("a").await;
        let first = queue.receive(1, Duration::ZERO).await.unwrap();
        let _second = queue.receive(1, Duration::ZERO).await.unwrap();

        let err = queue.delete(&first[0].receipt_handle).await.unwrap_err();
        assert!(err.is_race());
        assert_eq!(queue.depth().await, 1);
    }

    #[tokio::test]
    async fn send_wakes_a_waiting_receive() {
        let queue = Arc::new(InMemoryWorkQueue::local());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.receive(1, Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.send("late").await;

        let got = waiter.await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body, "late");
    }
}
