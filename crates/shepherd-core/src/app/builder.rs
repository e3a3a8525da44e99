//! SupervisorBuilder: wiring configuration and ports into a `SchedulerLoop`.
//!
//! `build()` fails fast: invalid configuration or a missing port is reported
//! before anything talks to the queue or the cluster.

use std::sync::Arc;

use super::SchedulerLoop;
use crate::alert::Alerter;
use crate::config::SupervisorConfig;
use crate::error::ConfigError;
use crate::ports::{Clock, Cluster, LogFetcher, Notifier, SystemClock, WorkQueue};
use crate::queue::{BackoffPolicy, QueueClient};
use crate::tasks::{PlacementTemplate, TaskSupervisor};

/// Wires a scheduler from configuration and port implementations.
///
/// ```ignore
/// let scheduler = SupervisorBuilder::new(config)
///     .queue(queue)
///     .cluster(cluster)
///     .notifier(notifier)
///     .build()?;
/// ```
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    queue: Option<Arc<dyn WorkQueue>>,
    cluster: Option<Arc<dyn Cluster>>,
    notifier: Option<Arc<dyn Notifier>>,
    logs: Option<Arc<dyn LogFetcher>>,
    clock: Option<Arc<dyn Clock>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("missing port: {0}")]
    MissingPort(&'static str),
}

impl SupervisorBuilder {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            queue: None,
            cluster: None,
            notifier: None,
            logs: None,
            clock: None,
        }
    }

    pub fn queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Required when the config names a log group.
    pub fn logs(mut self, logs: Arc<dyn LogFetcher>) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<SchedulerLoop, BuildError> {
        self.config.validate()?;
        let config = self.config;
        let tuning = &config.tuning;

        let queue = self.queue.ok_or(BuildError::MissingPort("queue"))?;
        let cluster = self.cluster.ok_or(BuildError::MissingPort("cluster"))?;
        let notifier = self.notifier.ok_or(BuildError::MissingPort("notifier"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut alerter = Alerter::new(notifier, &config.topic, &config.stack_name)
            .with_call_timeout(tuning.call_timeout);
        if let Some(group) = &config.log_group {
            let logs = self.logs.ok_or(BuildError::MissingPort("logs"))?;
            alerter = alerter.with_logs(logs, group, tuning.log_excerpt_lines);
        }

        let queue_client = QueueClient::new(
            queue,
            Arc::new(alerter),
            BackoffPolicy::new(config.exponential_backoff),
        )
        .with_tuning(tuning);

        let template = PlacementTemplate {
            cluster: config.cluster.clone(),
            task_definition: config.task_definition.clone(),
            container_name: config.container_name.clone(),
        };
        let tasks = TaskSupervisor::new(cluster, clock, template, config.concurrency)
            .with_tuning(tuning);

        Ok(SchedulerLoop::new(queue_client, tasks, &config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::impls::{InMemoryCluster, InMemoryLogs, InMemoryWorkQueue, RecordingNotifier};

    fn wired(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
            .queue(Arc::new(InMemoryWorkQueue::local()))
            .cluster(Arc::new(InMemoryCluster::local("jobs")))
            .notifier(Arc::new(RecordingNotifier::new()))
    }

    #[test]
    fn build_success() {
        let scheduler = wired(test_config()).build().unwrap();
        assert_eq!(scheduler.counts().concurrency, 3);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = test_config();
        config.cluster = String::new();
        assert!(matches!(
            wired(config).build(),
            Err(BuildError::Config(ConfigError::Missing("cluster")))
        ));
    }

    #[test]
    fn build_requires_every_port() {
        let result = SupervisorBuilder::new(test_config())
            .queue(Arc::new(InMemoryWorkQueue::local()))
            .notifier(Arc::new(RecordingNotifier::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingPort("cluster"))));
    }

    #[test]
    fn log_group_needs_a_log_fetcher() {
        let mut config = test_config();
        config.log_group = Some("task-logs".to_string());

        assert!(matches!(
            wired(config.clone()).build(),
            Err(BuildError::MissingPort("logs"))
        ));
        assert!(wired(config).logs(Arc::new(InMemoryLogs::new())).build().is_ok());
    }
}
