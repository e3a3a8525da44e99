//! TaskSupervisor: dispatch and poll against a `Cluster`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use super::TaskIndex;
use crate::config::Tuning;
use crate::domain::{Envelope, FinishedTaskReport, Outcome, ResourceIds, RunningTask, TaskRef};
use crate::error::{DispatchError, PlacementError, TaskPollError};
use crate::ports::{
    Clock, Cluster, ContainerExit, DESCRIBE_BATCH, PlacedTask, PlacementRequest, TaskDescription,
};

/// Stop reason for a tracked task the cluster no longer reports.
pub const MISSING_FROM_CLUSTER: &str = "task missing from cluster";

/// The fixed part of every placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementTemplate {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
}

impl PlacementTemplate {
    pub fn request_for(&self, envelope: &Envelope) -> PlacementRequest {
        PlacementRequest {
            cluster: self.cluster.clone(),
            task_definition: self.task_definition.clone(),
            container_name: self.container_name.clone(),
            environment: envelope.environment(),
        }
    }
}

/// Result of one status sweep.
#[derive(Debug)]
pub struct TaskPoll {
    pub finished: Vec<FinishedTaskReport>,
    /// Slots open after removing finished tasks.
    pub free: usize,
}

/// Result of dispatching a batch of envelopes.
#[derive(Debug, Default)]
pub struct DispatchBatch {
    pub dispatched: Vec<TaskRef>,
    /// Envelopes that did not get a task, with the reason.
    pub failed: Vec<(Envelope, DispatchError)>,
}

/// Owns the in-flight task index. Only the scheduler loop holding this
/// supervisor mutates it.
pub struct TaskSupervisor {
    cluster: Arc<dyn Cluster>,
    clock: Arc<dyn Clock>,
    template: PlacementTemplate,
    index: TaskIndex,
    placement_retry_delay: Duration,
    max_placement_attempts: Option<u32>,
    fan_out: usize,
}

impl TaskSupervisor {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        clock: Arc<dyn Clock>,
        template: PlacementTemplate,
        concurrency: usize,
    ) -> Self {
        let tuning = Tuning::default();
        Self {
            cluster,
            clock,
            template,
            index: TaskIndex::new(concurrency),
            placement_retry_delay: tuning.placement_retry_delay,
            max_placement_attempts: tuning.max_placement_attempts,
            fan_out: tuning.fan_out,
        }
    }

    pub fn with_tuning(mut self, tuning: &Tuning) -> Self {
        self.placement_retry_delay = tuning.placement_retry_delay;
        self.max_placement_attempts = tuning.max_placement_attempts;
        self.fan_out = tuning.fan_out.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.index.limit()
    }

    pub fn in_flight(&self) -> usize {
        self.index.len()
    }

    pub fn free_slots(&self) -> usize {
        self.index.free_slots()
    }

    /// Start one task for `envelope`.
    ///
    /// A full index is refused before the cluster is contacted.
    pub async fn dispatch(&mut self, envelope: Envelope) -> Result<TaskRef, DispatchError> {
        if self.index.is_full() {
            warn!(
                message_id = %envelope.message_id,
                limit = self.index.limit(),
                "dispatch refused: concurrency limit reached"
            );
            return Err(DispatchError::AboveConcurrency {
                limit: self.index.limit(),
            });
        }
        let placed = self.place(&envelope).await?;
        self.track(placed, envelope).map_err(|(_, e)| e)
    }

    /// Dispatch a batch with at most `fan_out` placements outstanding.
    /// Envelopes beyond the free slots are refused without a cluster call.
    pub async fn dispatch_all(&mut self, envelopes: Vec<Envelope>) -> DispatchBatch {
        let mut batch = DispatchBatch::default();
        let limit = self.index.limit();

        let mut envelopes = envelopes.into_iter();
        let admitted: Vec<Envelope> = envelopes.by_ref().take(self.index.free_slots()).collect();
        for envelope in envelopes {
            batch
                .failed
                .push((envelope, DispatchError::AboveConcurrency { limit }));
        }

        let this = &*self;
        let pending: Vec<_> = admitted
            .into_iter()
            .map(|envelope| async move {
                let result = this.place(&envelope).await;
                (envelope, result)
            })
            .collect();
        let placements: Vec<(Envelope, Result<PlacedTask, DispatchError>)> =
            stream::iter(pending).buffered(self.fan_out).collect().await;

        for (envelope, result) in placements {
            match result {
                Ok(placed) => match self.track(placed, envelope) {
                    Ok(task_ref) => batch.dispatched.push(task_ref),
                    Err(refused) => batch.failed.push(refused),
                },
                Err(e) => batch.failed.push((envelope, e)),
            }
        }
        batch
    }

    /// Ask the cluster for a task, waiting out resource exhaustion.
    ///
    /// Without `max_placement_attempts` this keeps retrying for as long as the
    /// cluster stays full.
    async fn place(&self, envelope: &Envelope) -> Result<PlacedTask, DispatchError> {
        let request = self.template.request_for(envelope);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.cluster.run_task(&request).await {
                Ok(placed) => return Ok(placed),
                Err(PlacementError::ResourceExhausted(reason)) => {
                    if self
                        .max_placement_attempts
                        .is_some_and(|max| attempts >= max)
                    {
                        return Err(DispatchError::NotRun {
                            message_id: envelope.message_id.to_string(),
                            reason: format!("gave up after {attempts} attempts: {reason}"),
                        });
                    }
                    warn!(
                        message_id = %envelope.message_id,
                        attempts,
                        %reason,
                        retry_in = ?self.placement_retry_delay,
                        "cluster out of resources; retrying placement"
                    );
                    tokio::time::sleep(self.placement_retry_delay).await;
                }
                Err(PlacementError::Rejected(reason)) => {
                    return Err(DispatchError::NotRun {
                        message_id: envelope.message_id.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    fn track(
        &mut self,
        placed: PlacedTask,
        envelope: Envelope,
    ) -> Result<TaskRef, (Envelope, DispatchError)> {
        let task_ref = placed.task_ref.clone();
        let task = RunningTask {
            task_ref: placed.task_ref.clone(),
            resources: ResourceIds {
                cluster: placed.cluster,
                container_instance: placed.container_instance,
                task: placed.task_ref.into_string(),
            },
            envelope,
            dispatched_at: self.clock.now(),
        };

        match self.index.insert(task) {
            Ok(()) => {
                info!(task = %task_ref, "task dispatched");
                Ok(task_ref)
            }
            Err(task) => {
                error!(
                    task = %task_ref,
                    message_id = %task.envelope.message_id,
                    "placed task could not be tracked: concurrency limit reached"
                );
                Err((
                    task.envelope,
                    DispatchError::AboveConcurrency {
                        limit: self.index.limit(),
                    },
                ))
            }
        }
    }

    /// Sweep all tracked tasks, in chunks of at most `DESCRIBE_BATCH`.
    ///
    /// Nothing is removed from the index unless every chunk was answered.
    pub async fn poll(&mut self) -> Result<TaskPoll, TaskPollError> {
        let refs = self.index.refs();
        let mut answers = Vec::with_capacity(refs.len().div_ceil(DESCRIBE_BATCH));
        for chunk in refs.chunks(DESCRIBE_BATCH) {
            answers.push(
                self.cluster
                    .describe_tasks(&self.template.cluster, chunk)
                    .await?,
            );
        }

        let mut finished = Vec::new();
        for answer in answers {
            for description in answer.tasks {
                if description.lifecycle.is_terminal() {
                    finished.extend(self.finish(description));
                } else if let Some(task) = self.index.get_mut(&description.task_ref)
                    && task.resources.container_instance.is_none()
                {
                    task.resources.container_instance = description.container_instance;
                }
            }
            for task_ref in answer.missing {
                if let Some(task) = self.index.remove(&task_ref) {
                    warn!(
                        task = %task_ref,
                        message_id = %task.message_id(),
                        "tracked task missing from cluster"
                    );
                    let duration = self.elapsed_since(task.dispatched_at);
                    finished.push(FinishedTaskReport {
                        outcome: Outcome::Retry,
                        stop_reason: MISSING_FROM_CLUSTER.to_string(),
                        duration,
                        resources: task.resources,
                        envelope: task.envelope,
                    });
                }
            }
        }

        Ok(TaskPoll {
            finished,
            free: self.index.free_slots(),
        })
    }

    fn finish(&mut self, description: TaskDescription) -> Option<FinishedTaskReport> {
        let task = self.index.remove(&description.task_ref)?;
        let outcome =
            Outcome::from_exit_codes(description.containers.iter().map(|c| c.exit_code));
        let duration = match (description.started_at, description.stopped_at) {
            (Some(started), Some(stopped)) => (stopped - started).to_std().unwrap_or_default(),
            _ => self.elapsed_since(task.dispatched_at),
        };

        let mut resources = task.resources;
        if description.container_instance.is_some() {
            resources.container_instance = description.container_instance;
        }

        info!(
            task = %description.task_ref,
            message_id = %task.envelope.message_id,
            %outcome,
            duration_secs = duration.as_secs(),
            "task finished"
        );
        Some(FinishedTaskReport {
            outcome,
            stop_reason: stop_reason(description.stopped_reason, &description.containers),
            duration,
            resources,
            envelope: task.envelope,
        })
    }

    fn elapsed_since(&self, since: DateTime<Utc>) -> Duration {
        (self.clock.now() - since).to_std().unwrap_or_default()
    }
}

/// Scheduler stop reason followed by each container's exit.
fn stop_reason(stopped_reason: Option<String>, containers: &[ContainerExit]) -> String {
    let reason = stopped_reason
        .or_else(|| containers.iter().find_map(|c| c.reason.clone()))
        .unwrap_or_else(|| "stopped".to_string());
    if containers.is_empty() {
        return reason;
    }
    let exits: Vec<String> = containers
        .iter()
        .map(|c| match c.exit_code {
            Some(code) => format!("{}={code}", c.name),
            None => format!("{}=none", c.name),
        })
        .collect();
    format!("{reason} [{}]", exits.join(", "))
}
