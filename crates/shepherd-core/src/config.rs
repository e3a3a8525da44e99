//! Supervisor configuration.
//!
//! Startup values are required; `Tuning` carries the timing and fan-out knobs
//! with working defaults. `validate()` is the fail-fast gate used by
//! `SupervisorBuilder`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub cluster: String,
    pub task_definition: String,
    /// Container whose environment carries the work item.
    pub container_name: String,
    /// Ceiling on tasks in flight.
    pub concurrency: usize,
    pub queue: String,
    /// Alert destination.
    pub topic: String,
    /// Deployment name, used to qualify alert subjects.
    pub stack_name: String,
    pub exponential_backoff: bool,
    /// Where task logs live; `None` disables log excerpts in alerts.
    #[serde(default)]
    pub log_group: Option<String>,
    /// Retries up to this receive count requeue silently.
    pub notify_after_retries: u32,
    #[serde(default)]
    pub tuning: Tuning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Long-poll wait for one queue receive.
    pub poll_wait: Duration,
    /// Pause between scheduler cycles.
    pub cycle_delay: Duration,
    /// Pause before repeating a placement the cluster had no room for.
    pub placement_retry_delay: Duration,
    /// Give up on resource-exhausted placements after this many attempts.
    /// `None` keeps retrying.
    pub max_placement_attempts: Option<u32>,
    /// Upper bound for any single delete/visibility/log call.
    pub call_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Outstanding calls allowed within one stage.
    pub fan_out: usize,
    pub log_excerpt_lines: usize,
    pub alert_on_stage_errors: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            poll_wait: Duration::from_secs(20),
            cycle_delay: Duration::from_secs(1),
            placement_retry_delay: Duration::from_secs(5),
            max_placement_attempts: None,
            call_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
            fan_out: 10,
            log_excerpt_lines: 50,
            alert_on_stage_errors: true,
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("cluster", &self.cluster),
            ("task_definition", &self.task_definition),
            ("container_name", &self.container_name),
            ("queue", &self.queue),
            ("topic", &self.topic),
            ("stack_name", &self.stack_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tuning.fan_out == 0 {
            return Err(ConfigError::Invalid {
                field: "fan_out",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tuning.call_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "call_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.tuning.max_placement_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_placement_attempts",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        if self
            .log_group
            .as_deref()
            .is_some_and(|group| group.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "log_group",
                reason: "empty; leave unset to disable log excerpts".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        cluster: "jobs".to_string(),
        task_definition: "worker:7".to_string(),
        container_name: "worker".to_string(),
        concurrency: 3,
        queue: "work-queue".to_string(),
        topic: "alerts".to_string(),
        stack_name: "prod-pipeline".to_string(),
        exponential_backoff: true,
        log_group: None,
        notify_after_retries: 0,
        tuning: Tuning::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(test_config().validate(), Ok(()));
    }

    #[test]
    fn blank_required_value_is_missing() {
        let mut config = test_config();
        config.stack_name = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::Missing("stack_name")));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let mut config = test_config();
        config.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "concurrency", .. })
        ));
    }

    #[test]
    fn empty_log_group_is_rejected() {
        let mut config = test_config();
        config.log_group = Some(String::new());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "log_group", .. })
        ));
    }

    #[test]
    fn tuning_fills_in_when_absent() {
        let json = serde_json::json!({
            "cluster": "c",
            "task_definition": "td",
            "container_name": "w",
            "concurrency": 2,
            "queue": "q",
            "topic": "t",
            "stack_name": "s",
            "exponential_backoff": false,
            "notify_after_retries": 3
        });
        let config: SupervisorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.tuning, Tuning::default());
        assert_eq!(config.log_group, None);
        assert_eq!(config.validate(), Ok(()));
    }
}
