//! LogFetcher port: recent task output for alert enrichment.

use async_trait::async_trait;

use crate::error::LogFetchError;

#[async_trait]
pub trait LogFetcher: Send + Sync {
    /// The newest `limit` lines (oldest first) from streams in `destination`
    /// whose name starts with `stream_prefix`.
    async fn recent_lines(
        &self,
        destination: &str,
        stream_prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, LogFetchError>;
}
