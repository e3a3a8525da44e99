//! InMemoryCluster: a scripted cluster scheduler.
//!
//! Tasks follow a `TaskPlan`: they report `Running` for a number of status
//! queries, then `Stopped` with the planned exit codes. Plans are consumed in
//! placement order; when none is queued the cluster's `ExitSource` decides.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::TaskRef;
use crate::domain::envelope::ENV_MESSAGE;
use crate::error::{PlacementError, TaskPollError};
use crate::ports::{
    Clock, Cluster, ContainerExit, IdGenerator, PlacedTask, PlacementRequest, SystemClock,
    TaskDescription, TaskLifecycle, TaskStatusBatch, UlidGenerator,
};

/// Stop reason the simulated scheduler reports for every finished task.
pub const ESSENTIAL_CONTAINER_EXITED: &str = "Essential container in task exited";

/// How one simulated task ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPlan {
    /// One entry per container.
    pub exit_codes: Vec<Option<i32>>,
    /// Status queries answered with `Running` before the task stops.
    pub polls_until_stop: u32,
}

impl TaskPlan {
    pub fn exits(codes: &[i32]) -> Self {
        Self {
            exit_codes: codes.iter().copied().map(Some).collect(),
            polls_until_stop: 0,
        }
    }

    /// A single container that stopped without an exit code.
    pub fn never_started() -> Self {
        Self {
            exit_codes: vec![None],
            polls_until_stop: 0,
        }
    }

    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls_until_stop = polls;
        self
    }
}

/// Where exit codes come from when no plan is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSource {
    Fixed(TaskPlan),
    /// Parse the `Message` environment value as the exit code; anything that
    /// is not an integer exits 0.
    FromMessage { polls_until_stop: u32 },
}

#[derive(Debug)]
struct SimTask {
    container_name: String,
    container_instance: String,
    plan: TaskPlan,
    polls_seen: u32,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct ClusterState {
    tasks: HashMap<TaskRef, SimTask>,
    plans: VecDeque<TaskPlan>,
    placement_failures: VecDeque<PlacementError>,
    fail_next_describe: Option<TaskPollError>,
    requests: Vec<PlacementRequest>,
    describe_batches: Vec<usize>,
}

impl ClusterState {
    fn running(&self) -> usize {
        self.tasks.values().filter(|t| t.stopped_at.is_none()).count()
    }
}

pub struct InMemoryCluster {
    name: String,
    state: Mutex<ClusterState>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    exit_source: ExitSource,
    /// Running tasks the cluster has room for; `None` is unlimited.
    capacity: Option<usize>,
}

impl InMemoryCluster {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ClusterState::default()),
            clock,
            ids,
            exit_source: ExitSource::Fixed(TaskPlan::exits(&[0])),
            capacity: None,
        }
    }

    pub fn local(name: impl Into<String>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        Self::new(name, clock, ids)
    }

    pub fn with_exit_source(mut self, exit_source: ExitSource) -> Self {
        self.exit_source = exit_source;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Queue the plan for the next placement.
    pub async fn plan(&self, plan: TaskPlan) {
        self.state.lock().await.plans.push_back(plan);
    }

    /// Fail upcoming placements, one error per call.
    pub async fn fail_placement(&self, error: PlacementError) {
        self.state.lock().await.placement_failures.push_back(error);
    }

    pub async fn fail_next_describe(&self, error: TaskPollError) {
        self.state.lock().await.fail_next_describe = Some(error);
    }

    /// Drop a task so status queries report it missing.
    pub async fn forget(&self, task_ref: &TaskRef) {
        self.state.lock().await.tasks.remove(task_ref);
    }

    /// Every placement request received, including failed ones.
    pub async fn requests(&self) -> Vec<PlacementRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Size of each status query received.
    pub async fn describe_batches(&self) -> Vec<usize> {
        self.state.lock().await.describe_batches.clone()
    }

    pub async fn running(&self) -> usize {
        self.state.lock().await.running()
    }

    fn plan_from_source(&self, request: &PlacementRequest) -> TaskPlan {
        match &self.exit_source {
            ExitSource::Fixed(plan) => plan.clone(),
            ExitSource::FromMessage { polls_until_stop } => {
                let code = request
                    .environment
                    .iter()
                    .find(|var| var.name == ENV_MESSAGE)
                    .and_then(|var| var.value.trim().parse::<i32>().ok())
                    .unwrap_or(0);
                TaskPlan::exits(&[code]).after_polls(*polls_until_stop)
            }
        }
    }

    fn describe(&self, task_ref: &TaskRef, task: &mut SimTask) -> TaskDescription {
        task.polls_seen += 1;
        if task.stopped_at.is_none() && task.polls_seen > task.plan.polls_until_stop {
            task.stopped_at = Some(self.clock.now());
        }

        let stopped = task.stopped_at.is_some();
        let containers = task
            .plan
            .exit_codes
            .iter()
            .enumerate()
            .map(|(i, code)| ContainerExit {
                name: if i == 0 {
                    task.container_name.clone()
                } else {
                    format!("{}-sidecar-{i}", task.container_name)
                },
                exit_code: if stopped { *code } else { None },
                reason: None,
            })
            .collect();

        TaskDescription {
            task_ref: task_ref.clone(),
            lifecycle: if stopped {
                TaskLifecycle::Stopped
            } else {
                TaskLifecycle::Running
            },
            container_instance: Some(task.container_instance.clone()),
            stopped_reason: stopped.then(|| ESSENTIAL_CONTAINER_EXITED.to_string()),
            containers,
            started_at: Some(task.started_at),
            stopped_at: task.stopped_at,
        }
    }
}

#[async_trait]
impl Cluster for InMemoryCluster {
    async fn run_task(&self, request: &PlacementRequest) -> Result<PlacedTask, PlacementError> {
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());

        if let Some(error) = state.placement_failures.pop_front() {
            return Err(error);
        }
        if request.cluster != self.name {
            return Err(PlacementError::from_failure_reason(format!(
                "cluster {} not found",
                request.cluster
            )));
        }
        if self.capacity.is_some_and(|cap| state.running() >= cap) {
            return Err(PlacementError::from_failure_reason("RESOURCE:CPU"));
        }

        let plan = match state.plans.pop_front() {
            Some(plan) => plan,
            None => self.plan_from_source(request),
        };
        let task_ref = TaskRef::new(self.ids.task_ref(&self.name));
        let container_instance = format!("{}/instance/local", self.name);
        state.tasks.insert(
            task_ref.clone(),
            SimTask {
                container_name: request.container_name.clone(),
                container_instance: container_instance.clone(),
                plan,
                polls_seen: 0,
                started_at: self.clock.now(),
                stopped_at: None,
            },
        );

        Ok(PlacedTask {
            task_ref,
            cluster: self.name.clone(),
            container_instance: Some(container_instance),
        })
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        tasks: &[TaskRef],
    ) -> Result<TaskStatusBatch, TaskPollError> {
        let mut state = self.state.lock().await;
        state.describe_batches.push(tasks.len());
        if let Some(error) = state.fail_next_describe.take() {
            return Err(error);
        }
        if cluster != self.name {
            return Err(TaskPollError::Describe(format!("cluster {cluster} not found")));
        }

        let mut batch = TaskStatusBatch::default();
        for task_ref in tasks {
            match state.tasks.get_mut(task_ref) {
                Some(task) => batch.tasks.push(self.describe(task_ref, task)),
                None => batch.missing.push(task_ref.clone()),
            }
        }
        Ok(batch)
    }
}
