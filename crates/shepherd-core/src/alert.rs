//! Alert composition and delivery.
//!
//! Alerts go out through the `Notifier` port. Delivery failures are returned
//! to the caller, who logs them; an alert never holds up queue resolution.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{FinishedTaskReport, MessageId};
use crate::error::{LogFetchError, NotifyError, StageError};
use crate::ports::{LogFetcher, Notifier};

/// Longest subject the alert transport accepts, in characters.
pub const SUBJECT_LIMIT: usize = 100;

/// Cap on the log excerpt appended to a body, in characters. The newest
/// output is kept.
pub const MAX_EXCERPT_CHARS: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

/// Pick the first candidate that fits within `limit` characters. When none
/// does, the last (shortest) one is cut to the limit.
pub fn fit_subject(candidates: &[String], limit: usize) -> String {
    if let Some(fit) = candidates.iter().find(|c| c.chars().count() <= limit) {
        return fit.clone();
    }
    candidates
        .last()
        .map(|c| c.chars().take(limit).collect())
        .unwrap_or_default()
}

fn tail_chars(text: &str, limit: usize) -> &str {
    let total = text.chars().count();
    if total <= limit {
        return text;
    }
    let skip = total - limit;
    let start = text.char_indices().nth(skip).map_or(0, |(i, _)| i);
    &text[start..]
}

pub struct Alerter {
    notifier: Arc<dyn Notifier>,
    logs: Option<(Arc<dyn LogFetcher>, String)>,
    topic: String,
    stack_name: String,
    excerpt_lines: usize,
    call_timeout: Duration,
}

impl Alerter {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        topic: impl Into<String>,
        stack_name: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            logs: None,
            topic: topic.into(),
            stack_name: stack_name.into(),
            excerpt_lines: 50,
            call_timeout: Duration::from_secs(10),
        }
    }

    /// Enrich task alerts with recent output from `log_group`.
    pub fn with_logs(
        mut self,
        logs: Arc<dyn LogFetcher>,
        log_group: impl Into<String>,
        excerpt_lines: usize,
    ) -> Self {
        self.logs = Some((logs, log_group.into()));
        self.excerpt_lines = excerpt_lines;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Alert about a finished task, with a log excerpt when one is available.
    pub async fn task_finished(&self, report: &FinishedTaskReport) -> Result<(), NotifyError> {
        let excerpt = self.log_excerpt(report.message_id()).await;
        let alert = self.compose_finished(report, excerpt.as_deref());
        self.send(alert).await
    }

    /// Alert about a scheduler stage that failed.
    pub async fn stage_failed(&self, stage: &str, error: &StageError) -> Result<(), NotifyError> {
        let alert = Alert {
            subject: fit_subject(
                &[
                    format!("{}: supervisor {stage} failed", self.stack_name),
                    format!("{}: supervisor error", self.stack_name),
                ],
                SUBJECT_LIMIT,
            ),
            body: format!("Stage: {stage}\nError: {error}\n"),
        };
        self.send(alert).await
    }

    pub fn compose_finished(&self, report: &FinishedTaskReport, excerpt: Option<&[String]>) -> Alert {
        let id = report.message_id();
        let outcome = report.outcome;
        let item_subject = report.envelope.subject.trim();

        let mut candidates = Vec::with_capacity(3);
        if !item_subject.is_empty() {
            candidates.push(format!(
                "{}: {outcome} {id} ({item_subject})",
                self.stack_name
            ));
        }
        candidates.push(format!("{}: {outcome} {id}", self.stack_name));
        candidates.push(format!("{}: task {outcome}", self.stack_name));
        let subject = fit_subject(&candidates, SUBJECT_LIMIT);

        let mut body = String::new();
        let _ = writeln!(body, "Stack: {}", self.stack_name);
        let _ = writeln!(body, "Outcome: {outcome}");
        let _ = writeln!(body, "Stop reason: {}", report.stop_reason);
        let _ = writeln!(body, "Duration: {}s", report.duration.as_secs());
        let _ = writeln!(body, "Resources: {}", report.resources);
        let _ = writeln!(body);
        let _ = writeln!(body, "Environment:");
        for var in report.envelope.environment() {
            let _ = writeln!(body, "  {}={}", var.name, var.value);
        }

        if let Some(lines) = excerpt.filter(|lines| !lines.is_empty()) {
            let joined = lines.join("\n");
            let _ = writeln!(body);
            let _ = writeln!(body, "Recent log lines:");
            let _ = writeln!(body, "{}", tail_chars(&joined, MAX_EXCERPT_CHARS));
        }

        Alert { subject, body }
    }

    async fn log_excerpt(&self, id: &MessageId) -> Option<Vec<String>> {
        let (logs, group) = self.logs.as_ref()?;
        let fetch = logs.recent_lines(group, id.as_str(), self.excerpt_lines);
        let result = match tokio::time::timeout(self.call_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(LogFetchError::Timeout(self.call_timeout)),
        };
        match result {
            Ok(lines) => Some(lines),
            Err(e) => {
                warn!(message_id = %id, error = %e, "alert sent without log excerpt");
                None
            }
        }
    }

    async fn send(&self, alert: Alert) -> Result<(), NotifyError> {
        debug!(subject = %alert.subject, "publishing alert");
        let publish = self
            .notifier
            .publish(&self.topic, &alert.subject, &alert.body);
        tokio::time::timeout(self.call_timeout, publish)
            .await
            .unwrap_or(Err(NotifyError::Timeout(self.call_timeout)))
    }
}
