//! Outcome model: how a finished task is classified and what that means for
//! its queue message.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit code a task uses to report a permanent failure.
pub const EXIT_FAIL: i32 = 3;

/// Exit code a task uses to hand the item back untouched.
pub const EXIT_NOOP: i32 = 4;

/// Classification of a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Work done; drop the item.
    Success,
    /// Work failed permanently; drop the item and alert.
    Fail,
    /// Nothing done; make the item visible again right away.
    Noop,
    /// Work failed transiently; requeue with backoff and alert.
    Retry,
}

/// How a message goes back onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Visibility delay of `2^receive_count` seconds.
    WithBackoff,
    /// Visibility delay of zero.
    Immediate,
}

/// The queue-side actions bound to an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSet {
    pub ack: bool,
    pub requeue: Option<Requeue>,
    pub alert: bool,
}

impl Outcome {
    pub fn actions(self) -> ActionSet {
        match self {
            Outcome::Success => ActionSet {
                ack: true,
                requeue: None,
                alert: false,
            },
            Outcome::Fail => ActionSet {
                ack: true,
                requeue: None,
                alert: true,
            },
            Outcome::Noop => ActionSet {
                ack: false,
                requeue: Some(Requeue::Immediate),
                alert: false,
            },
            Outcome::Retry => ActionSet {
                ack: false,
                requeue: Some(Requeue::WithBackoff),
                alert: true,
            },
        }
    }

    /// Classify one container. A container that never produced an exit code
    /// is treated like any other unexpected code.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Outcome::Success,
            Some(EXIT_FAIL) => Outcome::Fail,
            Some(EXIT_NOOP) => Outcome::Noop,
            _ => Outcome::Retry,
        }
    }

    /// Classify a whole task. Containers must agree; any disagreement (and a
    /// task with no containers at all) yields `Retry` so an ambiguous result
    /// never passes as success.
    pub fn from_exit_codes<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = Option<i32>>,
    {
        codes
            .into_iter()
            .map(Outcome::from_exit_code)
            .reduce(|acc, next| if acc == next { acc } else { Outcome::Retry })
            .unwrap_or(Outcome::Retry)
    }

    /// Early retries stay quiet: a `Retry` whose item has been received no
    /// more than `notify_after_retries` times becomes a `Noop`.
    pub fn suppress_notify(self, receive_count: u32, notify_after_retries: u32) -> Self {
        if self == Outcome::Retry && receive_count <= notify_after_retries {
            Outcome::Noop
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Fail => "fail",
            Outcome::Noop => "noop",
            Outcome::Retry => "retry",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[Some(0)], Outcome::Success)]
    #[case(&[Some(3)], Outcome::Fail)]
    #[case(&[Some(4)], Outcome::Noop)]
    #[case(&[Some(1)], Outcome::Retry)]
    #[case(&[Some(137)], Outcome::Retry)]
    #[case(&[None], Outcome::Retry)]
    #[case(&[Some(0), Some(0)], Outcome::Success)]
    #[case(&[Some(3), Some(3)], Outcome::Fail)]
    #[case(&[Some(0), Some(1)], Outcome::Retry)]
    #[case(&[Some(0), Some(3)], Outcome::Retry)]
    #[case(&[Some(4), Some(4), Some(0)], Outcome::Retry)]
    #[case(&[], Outcome::Retry)]
    fn exit_code_table(#[case] codes: &[Option<i32>], #[case] expected: Outcome) {
        assert_eq!(Outcome::from_exit_codes(codes.iter().copied()), expected);
    }

    #[test]
    fn action_sets_match_outcomes() {
        let s = Outcome::Success.actions();
        assert!(s.ack && !s.alert && s.requeue.is_none());

        let f = Outcome::Fail.actions();
        assert!(f.ack && f.alert && f.requeue.is_none());

        let n = Outcome::Noop.actions();
        assert!(!n.ack && !n.alert);
        assert_eq!(n.requeue, Some(Requeue::Immediate));

        let r = Outcome::Retry.actions();
        assert!(!r.ack && r.alert);
        assert_eq!(r.requeue, Some(Requeue::WithBackoff));
    }

    #[rstest]
    #[case(Outcome::Retry, 1, 1, Outcome::Noop)]
    #[case(Outcome::Retry, 2, 1, Outcome::Retry)]
    #[case(Outcome::Retry, 1, 0, Outcome::Retry)]
    #[case(Outcome::Fail, 1, 5, Outcome::Fail)]
    #[case(Outcome::Success, 1, 5, Outcome::Success)]
    fn notify_suppression(
        #[case] outcome: Outcome,
        #[case] receive_count: u32,
        #[case] threshold: u32,
        #[case] expected: Outcome,
    ) {
        assert_eq!(outcome.suppress_notify(receive_count, threshold), expected);
    }

    #[test]
    fn serializes_snake_case() {
        let s = serde_json::to_string(&Outcome::Retry).unwrap();
        assert_eq!(s, "\"retry\"");
    }
}
