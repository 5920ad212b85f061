pub mod atomic;
pub mod result;
pub mod rules;
pub mod subscriptions;

use std::path::PathBuf;

use thiserror::Error;

use crate::app::Result;
use crate::domain::{CustomRule, Source};
use crate::parser::ParseError;

pub use result::{PublishedConfig, ResultStore};
pub use rules::TextRuleStore;
pub use subscriptions::JsonSubscriptionStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode subscriptions: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed custom rule in {path}: {source}")]
    Rule { path: PathBuf, source: ParseError },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Registered subscription sources.
pub trait SubscriptionStore: Send + Sync {
    fn add(&self, url: &str, name: Option<&str>) -> Result<Source>;
    fn list(&self) -> Result<Vec<Source>>;
    /// Returns the removed source, or `None` when no source has that id.
    fn delete(&self, id: &str) -> Result<Option<Source>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

/// The user's custom rules, kept ahead of every subscription rule.
pub trait RuleStore: Send + Sync {
    fn list(&self) -> Result<Vec<CustomRule>>;
    fn upsert(&self, rule: CustomRule) -> Result<UpsertOutcome>;
    /// Replace the whole list with the rules in `text`, one per line.
    /// Returns the number of rules stored.
    fn replace_all(&self, text: &str) -> Result<usize>;

    fn raw_lines(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|r| r.raw).collect())
    }
}
