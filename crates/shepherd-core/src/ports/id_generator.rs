//! IdGenerator port: identifiers minted by the in-memory adapters.
//!
//! Real queues and schedulers hand out their own identifiers; the local
//! adapters mint ULIDs so ids sort by creation time and stay unique without
//! coordination.

use std::sync::Arc;

use ulid::Ulid;

use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn message_id(&self) -> String;

    fn receipt_handle(&self) -> String;

    fn task_ref(&self, cluster: &str) -> String;
}

/// ULID-based generator. The timestamp part comes from the injected clock.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn message_id(&self) -> String {
        self.next().to_string().to_lowercase()
    }

    fn receipt_handle(&self) -> String {
        format!("rh-{}", self.next())
    }

    fn task_ref(&self, cluster: &str) -> String {
        format!("{cluster}/task/{}", self.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generated_ids_are_unique() {
        let ids = UlidGenerator::new(Arc::new(SystemClock));
        assert_ne!(ids.message_id(), ids.message_id());
        assert_ne!(ids.receipt_handle(), ids.receipt_handle());
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(Arc::new(FixedClock::new(at)));

        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        assert_eq!(a.timestamp_ms(), at.timestamp_millis() as u64);
        assert_eq!(b.timestamp_ms(), at.timestamp_millis() as u64);
    }

    #[test]
    fn task_refs_carry_the_cluster() {
        let ids = UlidGenerator::new(Arc::new(SystemClock));
        assert!(ids.task_ref("jobs").starts_with("jobs/task/"));
    }
}
