//! Cluster port: the scheduler remote tasks are placed on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{EnvVar, TaskRef};
use crate::error::{PlacementError, TaskPollError};

/// Most task references a single status query may carry.
pub const DESCRIBE_BATCH: usize = 100;

/// A request to start one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementRequest {
    pub cluster: String,
    pub task_definition: String,
    /// Container whose environment is overridden.
    pub container_name: String,
    pub environment: Vec<EnvVar>,
}

/// A task the scheduler accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedTask {
    pub task_ref: TaskRef,
    pub cluster: String,
    pub container_instance: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLifecycle {
    Provisioning,
    Pending,
    Running,
    Stopping,
    Stopped,
}

impl TaskLifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskLifecycle::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExit {
    pub name: String,
    /// `None` when the container never ran to completion.
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescription {
    pub task_ref: TaskRef,
    pub lifecycle: TaskLifecycle,
    pub container_instance: Option<String>,
    pub stopped_reason: Option<String>,
    pub containers: Vec<ContainerExit>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Answer to one status query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStatusBatch {
    pub tasks: Vec<TaskDescription>,
    /// References the scheduler no longer knows about.
    pub missing: Vec<TaskRef>,
}

#[async_trait]
pub trait Cluster: Send + Sync {
    async fn run_task(&self, request: &PlacementRequest) -> Result<PlacedTask, PlacementError>;

    /// Query status for at most `DESCRIBE_BATCH` tasks.
    async fn describe_tasks(
        &self,
        cluster: &str,
        tasks: &[TaskRef],
    ) -> Result<TaskStatusBatch, TaskPollError>;
}
