//! Envelope: the normalized form of a work item pulled off the queue.

use serde::{Deserialize, Serialize};

use super::ids::MessageId;
use crate::ports::ReceivedMessage;

/// Environment variable names handed to every task, in this order.
pub const ENV_MESSAGE_ID: &str = "MessageId";
pub const ENV_SUBJECT: &str = "Subject";
pub const ENV_MESSAGE: &str = "Message";
pub const ENV_SENT_TIMESTAMP: &str = "SentTimestamp";
pub const ENV_FIRST_RECEIVE_TIMESTAMP: &str = "ApproximateFirstReceiveTimestamp";
pub const ENV_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// A name/value pair for a container environment override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Notification wrapper carried in the raw message body.
#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Subject", default)]
    subject: Option<String>,
    #[serde(rename = "Message")]
    message: String,
}

/// One delivery of a work item.
///
/// `receipt_handle` is the ack token of the delivery this envelope was built
/// from. A later redelivery may carry a newer token; the queue client's
/// in-flight index always holds the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: MessageId,
    pub subject: String,
    pub message: String,
    pub receipt_handle: String,
    pub receive_count: u32,
    /// Epoch millis.
    pub sent_timestamp: i64,
    /// Epoch millis.
    pub first_receive_timestamp: i64,
}

impl Envelope {
    /// Normalize a raw delivery. A body that is not a notification wrapper is
    /// taken verbatim as the message, with an empty subject.
    pub fn from_received(raw: ReceivedMessage) -> Self {
        let (subject, message) = match serde_json::from_str::<Notification>(&raw.body) {
            Ok(n) => (n.subject.unwrap_or_default(), n.message),
            Err(_) => (String::new(), raw.body),
        };

        Self {
            message_id: MessageId::new(raw.message_id),
            subject,
            message,
            receipt_handle: raw.receipt_handle,
            receive_count: raw.receive_count,
            sent_timestamp: raw.sent_timestamp,
            first_receive_timestamp: raw.first_receive_timestamp,
        }
    }

    /// The environment passed to the task's container. Every value is a string.
    pub fn environment(&self) -> Vec<EnvVar> {
        vec![
            EnvVar::new(ENV_MESSAGE_ID, self.message_id.as_str()),
            EnvVar::new(ENV_SUBJECT, self.subject.as_str()),
            EnvVar::new(ENV_MESSAGE, self.message.as_str()),
            EnvVar::new(ENV_SENT_TIMESTAMP, self.sent_timestamp.to_string()),
            EnvVar::new(
                ENV_FIRST_RECEIVE_TIMESTAMP,
                self.first_receive_timestamp.to_string(),
            ),
            EnvVar::new(ENV_RECEIVE_COUNT, self.receive_count.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(body: &str) -> ReceivedMessage {
        ReceivedMessage {
            message_id: "m-1".to_string(),
            receipt_handle: "r-1".to_string(),
            body: body.to_string(),
            sent_timestamp: 1_700_000_000_000,
            first_receive_timestamp: 1_700_000_000_500,
            receive_count: 2,
        }
    }

    #[test]
    fn unwraps_notification_body() {
        let env = Envelope::from_received(raw(r#"{"Subject":"build","Message":"{\"repo\":\"x\"}"}"#));
        assert_eq!(env.subject, "build");
        assert_eq!(env.message, r#"{"repo":"x"}"#);
        assert_eq!(env.receipt_handle, "r-1");
    }

    #[test]
    fn null_subject_becomes_empty() {
        let env = Envelope::from_received(raw(r#"{"Subject":null,"Message":"hi"}"#));
        assert_eq!(env.subject, "");
        assert_eq!(env.message, "hi");
    }

    #[test]
    fn plain_body_is_used_verbatim() {
        let env = Envelope::from_received(raw("just text"));
        assert_eq!(env.subject, "");
        assert_eq!(env.message, "just text");
    }

    #[test]
    fn environment_is_exactly_six_string_values() {
        let env = Envelope::from_received(raw(r#"{"Subject":"s","Message":"m"}"#));
        let vars = env.environment();
        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "MessageId",
                "Subject",
                "Message",
                "SentTimestamp",
                "ApproximateFirstReceiveTimestamp",
                "ApproximateReceiveCount",
            ]
        );
        assert_eq!(vars[0].value, "m-1");
        assert_eq!(vars[3].value, "1700000000000");
        assert_eq!(vars[4].value, "1700000000500");
        assert_eq!(vars[5].value, "2");
    }
}
