//! Point-in-time view of the supervisor, logged by the heartbeat.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorCounts {
    pub concurrency: usize,
    pub tasks_in_flight: usize,
    pub messages_in_flight: usize,
}

impl SupervisorCounts {
    pub fn free_slots(&self) -> usize {
        self.concurrency.saturating_sub(self.tasks_in_flight)
    }
}

/// What one scheduler cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Tasks observed as stopped.
    pub finished: usize,
    /// Reports whose actions were carried out on the queue.
    pub resolved: usize,
    pub received: usize,
    pub dispatched: usize,
    /// Envelopes that did not get a task.
    pub unplaced: usize,
    pub stage_errors: usize,
}

/// Totals over a whole run, returned when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub finished: u64,
    pub resolved: u64,
    pub dispatched: u64,
    pub unplaced: u64,
    pub stage_errors: u64,
    /// State at shutdown. Tasks still running are left alone.
    pub counts: SupervisorCounts,
}

impl RunSummary {
    pub fn record(&mut self, cycle: &CycleReport) {
        self.cycles += 1;
        self.finished += cycle.finished as u64;
        self.resolved += cycle.resolved as u64;
        self.dispatched += cycle.dispatched as u64;
        self.unplaced += cycle.unplaced as u64;
        self.stage_errors += cycle.stage_errors as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_accumulates_cycles() {
        let mut summary = RunSummary::default();
        let cycle = CycleReport {
            finished: 2,
            resolved: 2,
            received: 1,
            dispatched: 1,
            unplaced: 0,
            stage_errors: 1,
        };
        summary.record(&cycle);
        summary.record(&cycle);

        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.resolved, 4);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.stage_errors, 2);
    }

    #[test]
    fn free_slots_never_underflow() {
        let counts = SupervisorCounts {
            concurrency: 2,
            tasks_in_flight: 3,
            messages_in_flight: 3,
        };
        assert_eq!(counts.free_slots(), 0);
    }
}
