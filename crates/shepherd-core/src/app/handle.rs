//! SupervisorHandle: runs a `SchedulerLoop` on its own tokio task.
//!
//! Shutdown goes through a `watch` channel; the loop finishes its current
//! cycle and hands back a `RunSummary`.

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use super::SchedulerLoop;
use super::status::RunSummary;

/// Handle to a spawned scheduler.
/// - dropping the handle also stops the scheduler after its current cycle
/// - `shutdown_and_join()` waits for the run summary
pub struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<RunSummary>,
}

impl SupervisorHandle {
    pub fn spawn(scheduler: SchedulerLoop) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(scheduler.run(shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Ask the scheduler to stop once the current cycle is done. Tasks already
    /// running on the cluster are left alone.
    pub fn request_shutdown(&self) {
        // the receiver is gone only if the scheduler already stopped
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn shutdown_and_join(self) -> Result<RunSummary, JoinError> {
        self.request_shutdown();
        self.join.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::app::SupervisorBuilder;
    use crate::config::test_config;
    use crate::impls::{InMemoryCluster, InMemoryWorkQueue, RecordingNotifier};

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_the_run_summary() {
        let mut config = test_config();
        config.tuning.poll_wait = Duration::from_millis(50);
        let queue = Arc::new(InMemoryWorkQueue::local());
        queue.send("5").await;
        let scheduler = SupervisorBuilder::new(config)
            .queue(queue.clone())
            .cluster(Arc::new(InMemoryCluster::local("jobs")))
            .notifier(Arc::new(RecordingNotifier::new()))
            .build()
            .unwrap();

        let handle = SupervisorHandle::spawn(scheduler);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());

        let summary = handle.shutdown_and_join().await.unwrap();
        assert!(summary.cycles >= 2);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.resolved, 1);
        assert_eq!(queue.depth().await, 0);
    }
}
