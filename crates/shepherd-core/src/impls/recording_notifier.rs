//! RecordingNotifier: keeps every alert in memory.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::NotifyError;
use crate::ports::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub topic: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
    failure: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().await.clone()
    }

    /// Fail every publish from now on.
    pub async fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().await = Some(reason.into());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, topic: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if let Some(reason) = self.failure.lock().await.clone() {
            return Err(NotifyError::Publish(reason));
        }
        self.sent.lock().await.push(SentAlert {
            topic: topic.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_until_told_to_fail() {
        let notifier = RecordingNotifier::new();
        notifier.publish("t", "s", "b").await.unwrap();
        notifier.fail_with("down").await;
        let err = notifier.publish("t", "s2", "b").await.unwrap_err();

        assert_eq!(err, NotifyError::Publish("down".to_string()));
        assert_eq!(notifier.sent().await.len(), 1);
    }
}
