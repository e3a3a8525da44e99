//! SchedulerLoop: the single control flow that drives the queue and the
//! cluster.
//!
//! One cycle runs `poll tasks -> resolve finished -> poll queue -> dispatch`
//! strictly in sequence, then sleeps `cycle_delay`. Stage errors are logged
//! (and optionally alerted) and never end the loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::status::{CycleReport, RunSummary, SupervisorCounts};
use crate::config::SupervisorConfig;
use crate::domain::{FinishedTaskReport, Outcome};
use crate::error::{DispatchError, StageError};
use crate::queue::{QueueClient, Resolution};
use crate::tasks::TaskSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PollTasks,
    Resolve,
    PollQueue,
    Dispatch,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::PollTasks => "poll_tasks",
            Stage::Resolve => "resolve",
            Stage::PollQueue => "poll_queue",
            Stage::Dispatch => "dispatch",
        }
    }
}

pub struct SchedulerLoop {
    queue: QueueClient,
    tasks: TaskSupervisor,
    notify_after_retries: u32,
    cycle_delay: Duration,
    heartbeat_interval: Duration,
    alert_on_stage_errors: bool,
    last_heartbeat: Option<Instant>,
}

impl SchedulerLoop {
    pub fn new(queue: QueueClient, tasks: TaskSupervisor, config: &SupervisorConfig) -> Self {
        Self {
            queue,
            tasks,
            notify_after_retries: config.notify_after_retries,
            cycle_delay: config.tuning.cycle_delay,
            heartbeat_interval: config.tuning.heartbeat_interval,
            alert_on_stage_errors: config.tuning.alert_on_stage_errors,
            last_heartbeat: None,
        }
    }

    pub fn counts(&self) -> SupervisorCounts {
        SupervisorCounts {
            concurrency: self.tasks.concurrency(),
            tasks_in_flight: self.tasks.in_flight(),
            messages_in_flight: self.queue.in_flight(),
        }
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// The cycle in progress always completes. Running tasks are not stopped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        info!(
            concurrency = self.tasks.concurrency(),
            notify_after_retries = self.notify_after_retries,
            "scheduler started"
        );

        let mut summary = RunSummary::default();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle = self.run_cycle().await;
            summary.record(&cycle);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.cycle_delay) => {}
            }
        }

        summary.counts = self.counts();
        info!(
            cycles = summary.cycles,
            resolved = summary.resolved,
            tasks_in_flight = summary.counts.tasks_in_flight,
            messages_in_flight = summary.counts.messages_in_flight,
            "finished"
        );
        summary
    }

    /// One pass over all stages.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut cycle = CycleReport::default();

        let finished = match self.tasks.poll().await {
            Ok(poll) => poll.finished,
            Err(e) => {
                cycle.stage_errors += 1;
                self.stage_failed(Stage::PollTasks, e.into()).await;
                Vec::new()
            }
        };
        cycle.finished = finished.len();
        self.resolve(finished, &mut cycle).await;

        let free = self.tasks.free_slots();
        let envelopes = match self.queue.poll(free).await {
            Ok(envelopes) => envelopes,
            Err(e) => {
                cycle.stage_errors += 1;
                self.stage_failed(Stage::PollQueue, e.into()).await;
                Vec::new()
            }
        };
        cycle.received = envelopes.len();

        if !envelopes.is_empty() {
            let batch = self.tasks.dispatch_all(envelopes).await;
            cycle.dispatched = batch.dispatched.len();
            cycle.unplaced = batch.failed.len();

            let unplaced = batch
                .failed
                .into_iter()
                .map(|(envelope, e)| {
                    let outcome = match e {
                        DispatchError::AboveConcurrency { .. } => Outcome::Noop,
                        DispatchError::NotRun { .. } => Outcome::Retry,
                    };
                    let reason = e.to_string();
                    log_stage_error(Stage::Dispatch, &StageError::from(e));
                    FinishedTaskReport::unplaced(envelope, outcome, reason)
                })
                .collect();
            self.resolve(unplaced, &mut cycle).await;
        }

        self.heartbeat_if_due();
        cycle
    }

    async fn resolve(&mut self, reports: Vec<FinishedTaskReport>, cycle: &mut CycleReport) {
        if reports.is_empty() {
            return;
        }

        let notify_after = self.notify_after_retries;
        let reports: Vec<FinishedTaskReport> = reports
            .into_iter()
            .map(|mut report| {
                let outcome = report
                    .outcome
                    .suppress_notify(report.receive_count(), notify_after);
                if outcome != report.outcome {
                    debug!(
                        message_id = %report.message_id(),
                        receive_count = report.receive_count(),
                        "retry below notify threshold; requeueing silently"
                    );
                    report.outcome = outcome;
                }
                report
            })
            .collect();

        let results = self.queue.resolve_all(&reports).await;
        for result in results {
            match result {
                Ok(Resolution::Resolved) => cycle.resolved += 1,
                Ok(Resolution::AlreadyResolved) => {}
                Err(e) => {
                    cycle.stage_errors += 1;
                    self.stage_failed(Stage::Resolve, e.into()).await;
                }
            }
        }
    }

    async fn stage_failed(&self, stage: Stage, error: StageError) {
        log_stage_error(stage, &error);
        if !self.alert_on_stage_errors {
            return;
        }
        if let Err(e) = self.queue.alerter().stage_failed(stage.as_str(), &error).await {
            warn!(stage = stage.as_str(), error = %e, "stage alert not delivered");
        }
    }

    fn heartbeat_if_due(&mut self) {
        let now = Instant::now();
        if self
            .last_heartbeat
            .is_some_and(|at| now.duration_since(at) < self.heartbeat_interval)
        {
            return;
        }
        self.last_heartbeat = Some(now);

        let counts = self.counts();
        info!(
            concurrency = counts.concurrency,
            tasks_in_flight = counts.tasks_in_flight,
            messages_in_flight = counts.messages_in_flight,
            "heartbeat"
        );
    }
}

fn log_stage_error(stage: Stage, error: &StageError) {
    error!(stage = stage.as_str(), error = %error, "stage failed");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::SupervisorBuilder;
    use crate::config::{Tuning, test_config};
    use crate::error::{PlacementError, QueueError, TaskPollError};
    use crate::impls::{InMemoryCluster, InMemoryWorkQueue, QueueCall, RecordingNotifier, TaskPlan};

    struct Fixture {
        queue: Arc<InMemoryWorkQueue>,
        cluster: Arc<InMemoryCluster>,
        notifier: Arc<RecordingNotifier>,
        scheduler: SchedulerLoop,
    }

    fn fixture(config: SupervisorConfig) -> Fixture {
        let queue = Arc::new(InMemoryWorkQueue::local());
        let cluster = Arc::new(InMemoryCluster::local("jobs"));
        let notifier = Arc::new(RecordingNotifier::new());
        let scheduler = SupervisorBuilder::new(config)
            .queue(queue.clone())
            .cluster(cluster.clone())
            .notifier(notifier.clone())
            .build()
            .unwrap();
        Fixture {
            queue,
            cluster,
            notifier,
            scheduler,
        }
    }

    fn quick_config() -> SupervisorConfig {
        let mut config = test_config();
        config.tuning = Tuning {
            poll_wait: Duration::from_millis(10),
            cycle_delay: Duration::from_millis(10),
            ..Tuning::default()
        };
        config
    }

    fn notification(message: &str) -> String {
        serde_json::json!({ "Subject": "job", "Message": message }).to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_then_resolves_on_the_next_cycle() {
        let mut f = fixture(quick_config());
        f.queue.send(notification("a")).await;

        let first = f.scheduler.run_cycle().await;
        assert_eq!(first.received, 1);
        assert_eq!(first.dispatched, 1);
        assert_eq!(f.scheduler.counts().tasks_in_flight, 1);
        assert_eq!(f.scheduler.counts().messages_in_flight, 1);

        let second = f.scheduler.run_cycle().await;
        assert_eq!(second.finished, 1);
        assert_eq!(second.resolved, 1);
        assert_eq!(f.queue.depth().await, 0);
        assert_eq!(f.scheduler.counts(), SupervisorCounts {
            concurrency: 3,
            tasks_in_flight: 0,
            messages_in_flight: 0,
        });
    }

    #[tokio::test(start_paused = true)]
    async fn queue_poll_is_sized_to_free_slots() {
        let mut f = fixture(quick_config());
        f.cluster.plan(TaskPlan::exits(&[0]).after_polls(10)).await;
        f.queue.send(notification("a")).await;
        f.scheduler.run_cycle().await;

        f.scheduler.run_cycle().await;

        let receives: Vec<usize> = f
            .queue
            .calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                QueueCall::Receive { max } => Some(max),
                _ => None,
            })
            .collect();
        assert_eq!(receives, vec![3, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_placement_requeues_the_message() {
        let mut f = fixture(quick_config());
        let id = f.queue.send(notification("a")).await;
        f.cluster
            .fail_placement(PlacementError::Rejected("bad definition".into()))
            .await;

        let cycle = f.scheduler.run_cycle().await;

        assert_eq!(cycle.unplaced, 1);
        assert_eq!(cycle.resolved, 1);
        assert_eq!(f.scheduler.counts().messages_in_flight, 0);
        assert!(f.queue.calls().await.contains(&QueueCall::ChangeVisibility {
            message_id: id,
            delay: Duration::from_secs(2),
        }));
        assert_eq!(f.notifier.sent().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_errors_are_alerted_and_the_cycle_continues() {
        let mut f = fixture(quick_config());
        f.queue.send(notification("a")).await;
        f.scheduler.run_cycle().await;

        f.cluster
            .fail_next_describe(TaskPollError::Describe("throttled".into()))
            .await;
        let cycle = f.scheduler.run_cycle().await;
        assert_eq!(cycle.stage_errors, 1);
        let sent = f.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "prod-pipeline: supervisor poll_tasks failed");

        let next = f.scheduler.run_cycle().await;
        assert_eq!(next.stage_errors, 0);
        assert_eq!(next.resolved, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_alerts_can_be_disabled() {
        let mut config = quick_config();
        config.tuning.alert_on_stage_errors = false;
        let mut f = fixture(config);
        f.queue.fail_next(QueueError::Transport("down".into())).await;

        let cycle = f.scheduler.run_cycle().await;
        assert_eq!(cycle.stage_errors, 1);
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_shutdown_is_requested() {
        let f = fixture(quick_config());
        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(f.scheduler.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let summary = run.await.unwrap();

        assert!(summary.cycles >= 1);
        assert_eq!(summary.counts.concurrency, 3);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn run_future_can_be_spawned() {
        let f = fixture(quick_config());
        let (_tx, rx) = watch::channel(false);
        let run = f.scheduler.run(rx);
        assert_send(&run);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_the_sender_is_dropped() {
        let f = fixture(quick_config());
        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(f.scheduler.run(rx));

        drop(tx);
        let summary = run.await.unwrap();
        assert!(summary.cycles <= 1);
    }
}
