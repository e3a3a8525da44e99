//! InMemoryLogs: log groups held in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::LogFetchError;
use crate::ports::LogFetcher;

/// group → (stream, line) in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryLogs {
    groups: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl InMemoryLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, group: &str, stream: &str, line: impl Into<String>) {
        self.groups
            .lock()
            .await
            .entry(group.to_string())
            .or_default()
            .push((stream.to_string(), line.into()));
    }
}

#[async_trait]
impl LogFetcher for InMemoryLogs {
    async fn recent_lines(
        &self,
        destination: &str,
        stream_prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, LogFetchError> {
        let groups = self.groups.lock().await;
        let entries = groups
            .get(destination)
            .ok_or_else(|| LogFetchError::Fetch(format!("log group {destination} not found")))?;

        let matching: Vec<&String> = entries
            .iter()
            .filter(|(stream, _)| stream.starts_with(stream_prefix))
            .map(|(_, line)| line)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }
}
