//! Backoff policy for requeued items.

use std::time::Duration;

/// Highest receive count that still gets a requeue. Past this the item is
/// left to expire on its own.
pub const MAX_BACKOFF_RECEIVE_COUNT: u32 = 14;

/// Decides the visibility delay for a `requeue-with-backoff` action.
///
/// Enabled: delay = 2^receive_count seconds
/// - receive 1: 2s
/// - receive 2: 4s
/// - receive 14: 16384s (about 4.5h)
///
/// Disabled: the item is made visible again at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub enabled: bool,
}

impl BackoffPolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `None` means no visibility call at all: the item has been received
    /// too often and is allowed to lapse naturally.
    pub fn next_delay(&self, receive_count: u32) -> Option<Duration> {
        if receive_count > MAX_BACKOFF_RECEIVE_COUNT {
            return None;
        }
        if !self.enabled {
            return Some(Duration::ZERO);
        }
        Some(Duration::from_secs(1u64 << receive_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_receive() {
        let policy = BackoffPolicy::new(true);
        for count in 1..=MAX_BACKOFF_RECEIVE_COUNT {
            assert_eq!(
                policy.next_delay(count),
                Some(Duration::from_secs(2u64.pow(count)))
            );
        }
    }

    #[test]
    fn delay_is_monotonic() {
        let policy = BackoffPolicy::new(true);
        let delays: Vec<_> = (1..=MAX_BACKOFF_RECEIVE_COUNT)
            .filter_map(|c| policy.next_delay(c))
            .collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn past_the_cap_there_is_no_requeue() {
        let policy = BackoffPolicy::new(true);
        assert_eq!(policy.next_delay(15), None);
        assert_eq!(policy.next_delay(u32::MAX), None);
    }

    #[test]
    fn disabled_policy_requeues_without_delay() {
        let policy = BackoffPolicy::new(false);
        assert_eq!(policy.next_delay(1), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(14), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(15), None);
    }
}
