use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::app::Result;
use crate::store::atomic::write_atomic;
use crate::store::StorageError;

/// Filename used when the merged document is downloaded.
pub const DOWNLOAD_FILENAME: &str = "merged_clash.yaml";
pub const MEDIA_TYPE: &str = "application/x-yaml";

/// One published version of the merged document.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedConfig {
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    /// Hex SHA-256 of `document`.
    pub digest: String,
    #[serde(skip)]
    pub document: String,
}

impl PublishedConfig {
    fn new(version: u64, document: String) -> Self {
        Self {
            version,
            generated_at: Utc::now(),
            digest: Self::digest_of(&document),
            document,
        }
    }

    pub fn digest_of(document: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(document.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Holds the last successfully merged document.
///
/// Publishing writes the file first and only then swaps the in-memory
/// pointer, so readers always get a complete document and a failed write
/// leaves the previous version in place.
pub struct ResultStore {
    path: Option<PathBuf>,
    current: ArcSwapOption<PublishedConfig>,
}

impl ResultStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let current = if path.exists() {
            let document = fs::read_to_string(&path).map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e,
            })?;
            (!document.trim().is_empty()).then(|| Arc::new(PublishedConfig::new(1, document)))
        } else {
            None
        };

        Ok(Self {
            path: Some(path),
            current: ArcSwapOption::new(current),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: ArcSwapOption::empty(),
        }
    }

    /// The current document, or `None` before the first successful run.
    pub fn get(&self) -> Option<Arc<PublishedConfig>> {
        self.current.load_full()
    }

    pub fn publish(&self, document: String) -> Result<Arc<PublishedConfig>> {
        let version = self.current.load_full().map_or(1, |c| c.version + 1);
        let published = Arc::new(PublishedConfig::new(version, document));

        if let Some(path) = &self.path {
            write_atomic(path, published.document.as_bytes()).map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e,
            })?;
        }
        self.current.store(Some(published.clone()));

        tracing::info!(
            version,
            digest = %published.digest,
            bytes = published.document.len(),
            "Published merged config"
        );
        Ok(published)
    }
}
