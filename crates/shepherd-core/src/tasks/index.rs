//! In-flight task index, bounded by the concurrency ceiling.

use std::collections::HashMap;

use crate::domain::{RunningTask, TaskRef};

#[derive(Debug)]
pub struct TaskIndex {
    tasks: HashMap<TaskRef, RunningTask>,
    limit: usize,
}

impl TaskIndex {
    pub fn new(limit: usize) -> Self {
        Self {
            tasks: HashMap::with_capacity(limit),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.limit
    }

    pub fn free_slots(&self) -> usize {
        self.limit.saturating_sub(self.tasks.len())
    }

    /// Track a task. A full index hands the task back untouched.
    pub fn insert(&mut self, task: RunningTask) -> Result<(), RunningTask> {
        if self.is_full() {
            return Err(task);
        }
        self.tasks.insert(task.task_ref.clone(), task);
        Ok(())
    }

    pub fn remove(&mut self, task_ref: &TaskRef) -> Option<RunningTask> {
        self.tasks.remove(task_ref)
    }

    pub fn get_mut(&mut self, task_ref: &TaskRef) -> Option<&mut RunningTask> {
        self.tasks.get_mut(task_ref)
    }

    /// Snapshot of tracked references, oldest dispatch first.
    pub fn refs(&self) -> Vec<TaskRef> {
        let mut tasks: Vec<&RunningTask> = self.tasks.values().collect();
        tasks.sort_by(|a, b| {
            a.dispatched_at
                .cmp(&b.dispatched_at)
                .then_with(|| a.task_ref.cmp(&b.task_ref))
        });
        tasks.into_iter().map(|t| t.task_ref.clone()).collect()
    }
}
