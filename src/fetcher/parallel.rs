use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::domain::Source;
use crate::fetcher::{FetchError, FetchFailure, Fetcher};

/// `0` starts every download at once.
pub const DEFAULT_WORKERS: usize = 0;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-source result of [`ParallelFetcher::fetch_all`].
pub type FetchOutcome = Result<(Source, String), FetchError>;

pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    /// `None` when concurrency is unbounded.
    semaphore: Option<Arc<Semaphore>>,
    timeout: Duration,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS, DEFAULT_TIMEOUT)
    }

    /// Cap concurrent downloads at `workers`; `0` means no cap.
    pub fn with_workers(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            semaphore: (workers > 0).then(|| Arc::new(Semaphore::new(workers))),
            timeout,
        }
    }

    /// Fetch every source concurrently.
    ///
    /// The returned outcomes are in the same order as `sources`, whatever
    /// order the downloads finish in. A failure never cancels its siblings.
    /// Each source's timeout starts when `fetch_all` is called, so time spent
    /// waiting for a worker slot counts against it.
    pub async fn fetch_all(&self, sources: Vec<Source>) -> Vec<FetchOutcome> {
        let mut meta = Vec::with_capacity(sources.len());
        let mut handles = Vec::with_capacity(sources.len());

        for source in sources {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let timeout = self.timeout;
            meta.push((source.id.clone(), source.url.clone()));

            handles.push(tokio::spawn(async move {
                let result = fetch_single_source(&fetcher, semaphore, &source.url, timeout).await;
                match result {
                    Ok(body) => Ok((source, body)),
                    Err(cause) => Err(FetchError {
                        source_id: source.id,
                        url: source.url,
                        cause,
                    }),
                }
            }));
        }

        let joined = join_all(handles).await;

        meta.into_iter()
            .zip(joined)
            .map(|((source_id, url), joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    Err(FetchError {
                        source_id,
                        url,
                        cause: FetchFailure::Aborted(e.to_string()),
                    })
                }
            })
            .collect()
    }
}

async fn fetch_single_source(
    fetcher: &Arc<dyn Fetcher + Send + Sync>,
    semaphore: Option<Arc<Semaphore>>,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchFailure> {
    let fetch = async {
        let _permit = match semaphore {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| FetchFailure::Aborted(e.to_string()))?,
            ),
            None => None,
        };
        fetcher.fetch(url).await
    };
    let body = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| FetchFailure::Timeout(timeout))??;

    tracing::debug!(url, bytes = body.len(), "Fetched subscription");
    Ok(body)
}
