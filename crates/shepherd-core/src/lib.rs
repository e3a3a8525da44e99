//! shepherd-core
//!
//! Runs one container task per queued work item and settles the item from
//! the task's exit code.
//!
//! # Modules
//! - **domain**: envelopes, outcomes, running tasks and reports
//! - **ports**: `WorkQueue`, `Cluster`, `Notifier`, `LogFetcher`, `Clock`, `IdGenerator`
//! - **queue**: `QueueClient` and the in-flight message index
//! - **tasks**: `TaskSupervisor` and the in-flight task index
//! - **app**: scheduler loop, builder, handle
//! - **alert**: alert composition
//! - **impls**: in-memory adapters for local runs and tests

pub mod alert;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod tasks;

pub use app::{SchedulerLoop, SupervisorBuilder, SupervisorHandle};
pub use config::{SupervisorConfig, Tuning};
