pub mod http_fetcher;
pub mod parallel;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Why a single download failed.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

/// A failed download, attributed to the source it was made for.
#[derive(Debug, Error)]
#[error("failed to fetch source {source_id} ({url}): {cause}")]
pub struct FetchError {
    pub source_id: String,
    pub url: String,
    #[source]
    pub cause: FetchFailure,
}

#[async_trait]
pub trait Fetcher {
    /// Download the raw subscription document at `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchFailure>;
}
