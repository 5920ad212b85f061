use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use url::Url;

use crate::app::Result;
use crate::domain::Source;
use crate::store::atomic::write_atomic;
use crate::store::{StorageError, SubscriptionStore};

/// Subscription list persisted as a pretty-printed JSON array.
pub struct JsonSubscriptionStore {
    path: Option<PathBuf>,
    sources: Mutex<Vec<Source>>,
}

impl JsonSubscriptionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sources = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e,
            })?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).map_err(|e| StorageError::Decode {
                    path: path.clone(),
                    source: e,
                })?
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            path: Some(path),
            sources: Mutex::new(sources),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            sources: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Source>>> {
        Ok(self.sources.lock().map_err(|_| StorageError::Poisoned)?)
    }

    /// Persist `sources`; the in-memory list is only updated by the caller
    /// once this succeeds.
    fn persist(&self, sources: &[Source]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(sources).map_err(StorageError::Encode)?;
        write_atomic(path, json.as_bytes()).map_err(|e| StorageError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

impl SubscriptionStore for JsonSubscriptionStore {
    fn add(&self, url: &str, name: Option<&str>) -> Result<Source> {
        let url = Url::parse(url.trim())?;
        let source = Source::new(url.to_string(), name.map(String::from));

        let mut sources = self.lock()?;
        let mut next = sources.clone();
        next.push(source.clone());
        self.persist(&next)?;
        *sources = next;

        tracing::info!(source_id = %source.id, url = %source.url, "Added subscription");
        Ok(source)
    }

    fn list(&self) -> Result<Vec<Source>> {
        Ok(self.lock()?.clone())
    }

    fn delete(&self, id: &str) -> Result<Option<Source>> {
        let mut sources = self.lock()?;
        let Some(position) = sources.iter().position(|s| s.id == id) else {
            return Ok(None);
        };
        let mut next = sources.clone();
        let removed = next.remove(position);
        self.persist(&next)?;
        *sources = next;

        tracing::info!(source_id = %id, name = %removed.display_name(), "Removed subscription");
        Ok(Some(removed))
    }
}
