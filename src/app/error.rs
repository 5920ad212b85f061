use thiserror::Error;

use crate::merger::MergeError;
use crate::parser::ParseError;
use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum SubmergeError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subscription not found: {0}")]
    SourceNotFound(String),

    #[error("No subscriptions to merge")]
    NoSubscriptions,

    #[error("Refresh already in progress")]
    RefreshInProgress,

    #[error("Refresh task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SubmergeError>;
