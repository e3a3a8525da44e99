//! QueueClient: poll and resolve against a `WorkQueue`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::{BackoffPolicy, MessageIndex};
use crate::alert::Alerter;
use crate::config::Tuning;
use crate::domain::{Envelope, FinishedTaskReport, MessageId, Requeue};
use crate::error::QueueError;
use crate::ports::{MAX_RECEIVE_BATCH, WorkQueue};

/// What `resolve` did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The outcome's actions were carried out.
    Resolved,
    /// The item was not in flight; nothing was done.
    AlreadyResolved,
}

/// Owns the in-flight message index. Only the scheduler loop holding this
/// client mutates it.
pub struct QueueClient {
    queue: Arc<dyn WorkQueue>,
    alerter: Arc<Alerter>,
    backoff: BackoffPolicy,
    index: MessageIndex,
    poll_wait: Duration,
    call_timeout: Duration,
    fan_out: usize,
}

impl QueueClient {
    pub fn new(queue: Arc<dyn WorkQueue>, alerter: Arc<Alerter>, backoff: BackoffPolicy) -> Self {
        let tuning = Tuning::default();
        Self {
            queue,
            alerter,
            backoff,
            index: MessageIndex::new(),
            poll_wait: tuning.poll_wait,
            call_timeout: tuning.call_timeout,
            fan_out: tuning.fan_out,
        }
    }

    pub fn with_tuning(mut self, tuning: &Tuning) -> Self {
        self.poll_wait = tuning.poll_wait;
        self.call_timeout = tuning.call_timeout;
        self.fan_out = tuning.fan_out.max(1);
        self
    }

    pub fn alerter(&self) -> &Arc<Alerter> {
        &self.alerter
    }

    /// Number of items handed out and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.index.len()
    }

    pub fn is_in_flight(&self, id: &MessageId) -> bool {
        self.index.receipt(id).is_some()
    }

    /// Long-poll for up to `min(max_count, 10)` new items.
    ///
    /// Redeliveries of tracked items refresh their receipt and are left out of
    /// the result.
    pub async fn poll(&mut self, max_count: usize) -> Result<Vec<Envelope>, QueueError> {
        let batch = max_count.min(MAX_RECEIVE_BATCH);
        if batch == 0 {
            return Ok(Vec::new());
        }

        let bound = self.poll_wait + self.call_timeout;
        let received = tokio::time::timeout(bound, self.queue.receive(batch, self.poll_wait))
            .await
            .unwrap_or_else(|_| {
                Err(QueueError::Timeout {
                    op: "receive",
                    after: bound,
                })
            })?;

        let mut fresh = Vec::with_capacity(received.len());
        for raw in received {
            let id = MessageId::new(raw.message_id.as_str());
            if self.index.observe(&id, &raw.receipt_handle) {
                debug!(message_id = %id, receive_count = raw.receive_count, "new item");
                fresh.push(Envelope::from_received(raw));
            } else {
                debug!(message_id = %id, "redelivery of in-flight item; receipt refreshed");
            }
        }
        Ok(fresh)
    }

    /// Carry out the report's outcome on the queue.
    ///
    /// An item no longer in flight is treated as already resolved. The entry
    /// leaves the index even when an action fails.
    pub async fn resolve(
        &mut self,
        report: &FinishedTaskReport,
    ) -> Result<Resolution, QueueError> {
        let Some(receipt) = self.index.take(report.message_id()) else {
            debug!(message_id = %report.message_id(), "already resolved");
            return Ok(Resolution::AlreadyResolved);
        };
        self.apply(report, &receipt).await?;
        Ok(Resolution::Resolved)
    }

    /// Resolve a batch with at most `fan_out` items in progress at once.
    /// Results line up with `reports`.
    pub async fn resolve_all(
        &mut self,
        reports: &[FinishedTaskReport],
    ) -> Vec<Result<Resolution, QueueError>> {
        let claimed: Vec<_> = reports
            .iter()
            .map(|report| (report, self.index.take(report.message_id())))
            .collect();

        let this = &*self;
        let pending: Vec<_> = claimed
            .into_iter()
            .map(|(report, receipt)| async move {
                match receipt {
                    None => Ok(Resolution::AlreadyResolved),
                    Some(receipt) => this
                        .apply(report, &receipt)
                        .await
                        .map(|()| Resolution::Resolved),
                }
            })
            .collect();
        stream::iter(pending)
            .buffered(self.fan_out)
            .collect()
            .await
    }

    async fn apply(&self, report: &FinishedTaskReport, receipt: &str) -> Result<(), QueueError> {
        let id = report.message_id();
        let actions = report.outcome.actions();
        let mut failure = None;

        if actions.ack {
            let result = self.timed("delete", self.queue.delete(receipt)).await;
            keep_first_failure(id, "delete", result, &mut failure);
        }

        match actions.requeue {
            Some(Requeue::Immediate) => {
                let result = self
                    .timed(
                        "change_visibility",
                        self.queue.change_visibility(receipt, Duration::ZERO),
                    )
                    .await;
                keep_first_failure(id, "requeue", result, &mut failure);
            }
            Some(Requeue::WithBackoff) => match self.backoff.next_delay(report.receive_count()) {
                Some(delay) => {
                    let result = self
                        .timed(
                            "change_visibility",
                            self.queue.change_visibility(receipt, delay),
                        )
                        .await;
                    keep_first_failure(id, "requeue", result, &mut failure);
                }
                None => debug!(
                    message_id = %id,
                    receive_count = report.receive_count(),
                    "past the requeue cap; item left to expire"
                ),
            },
            None => {}
        }

        if actions.alert
            && let Err(e) = self.alerter.task_finished(report).await
        {
            warn!(message_id = %id, error = %e, "alert not delivered");
        }

        info!(
            message_id = %id,
            outcome = %report.outcome,
            duration_secs = report.duration.as_secs(),
            "item resolved"
        );
        failure.map_or(Ok(()), Err)
    }

    async fn timed<F>(&self, op: &'static str, call: F) -> Result<(), QueueError>
    where
        F: Future<Output = Result<(), QueueError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(QueueError::Timeout {
                    op,
                    after: self.call_timeout,
                })
            })
    }
}

/// Races with expiry or another consumer are expected and dropped; the first
/// real failure is kept for the caller.
fn keep_first_failure(
    id: &MessageId,
    action: &'static str,
    result: Result<(), QueueError>,
    failure: &mut Option<QueueError>,
) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_race() => {
            debug!(message_id = %id, action, error = %e, "receipt gone; ignoring");
        }
        Err(e) => {
            warn!(message_id = %id, action, error = %e, "queue action failed");
            failure.get_or_insert(e);
        }
    }
}
