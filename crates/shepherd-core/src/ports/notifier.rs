//! Notifier port: the alert channel.

use async_trait::async_trait;

use crate::error::NotifyError;

/// Publishes an alert. Callers treat failures as log-only.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}
