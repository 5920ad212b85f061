//! Fetch → Parse → Merge → Persist.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::app::{Result, SubmergeError};
use crate::domain::source::default_label;
use crate::domain::Source;
use crate::fetcher::parallel::ParallelFetcher;
use crate::merger::{MergeEngine, MergeError, MergeInput};
use crate::parser::ConfigParser;
use crate::store::{ResultStore, RuleStore, SubscriptionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Fetch,
    Parse,
}

/// A source that was dropped from a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub url: String,
    pub label: String,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Labels of the sources that made it into the merge, in order.
    pub merged: Vec<String>,
    pub failures: Vec<SourceFailure>,
    pub proxies: usize,
    pub proxy_groups: usize,
    pub rules: usize,
    /// Published version; `None` for ephemeral merges.
    pub version: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    subscriptions: Arc<dyn SubscriptionStore>,
    rules: Arc<dyn RuleStore>,
    results: Arc<ResultStore>,
    fetcher: ParallelFetcher,
    parser: ConfigParser,
    engine: MergeEngine,
}

impl Pipeline {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        rules: Arc<dyn RuleStore>,
        results: Arc<ResultStore>,
        fetcher: ParallelFetcher,
        engine: MergeEngine,
    ) -> Self {
        Self {
            subscriptions,
            rules,
            results,
            fetcher,
            parser: ConfigParser::new(),
            engine,
        }
    }

    /// Merge every registered subscription and publish the result.
    ///
    /// On any error the previously published document is left untouched.
    pub async fn refresh(&self) -> Result<RunReport> {
        let sources = self.subscriptions.list()?;
        if sources.is_empty() {
            return Err(SubmergeError::NoSubscriptions);
        }

        let labelled = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| {
                let label = source.label(i + 1);
                (source, label)
            })
            .collect();

        let (document, mut report) = self.fetch_and_merge(labelled, Vec::new()).await?;
        let published = self.results.publish(document)?;
        report.version = Some(published.version);
        Ok(report)
    }

    /// Merge an explicit list of URLs without touching any store except
    /// reading the custom rules.
    pub async fn merge_urls(&self, urls: &[String]) -> Result<(String, RunReport)> {
        if urls.is_empty() {
            return Err(SubmergeError::NoSubscriptions);
        }

        let mut labelled = Vec::with_capacity(urls.len());
        let mut failures = Vec::new();
        for (i, raw) in urls.iter().enumerate() {
            let id = format!("adhoc-{}", i + 1);
            let label = default_label(i + 1);
            match Url::parse(raw.trim()) {
                Ok(url) => {
                    let source = Source {
                        id,
                        url: url.to_string(),
                        name: None,
                    };
                    labelled.push((source, label));
                }
                Err(e) => {
                    tracing::warn!(url = %raw, %label, error = %e, "Dropping invalid subscription URL");
                    failures.push(SourceFailure {
                        source_id: id,
                        url: raw.clone(),
                        label,
                        stage: FailureStage::Fetch,
                        reason: SubmergeError::InvalidUrl(e).to_string(),
                    });
                }
            }
        }

        self.fetch_and_merge(labelled, failures).await
    }

    async fn fetch_and_merge(
        &self,
        labelled: Vec<(Source, String)>,
        mut failures: Vec<SourceFailure>,
    ) -> Result<(String, RunReport)> {
        let started_at = Utc::now();
        let start = Instant::now();

        let (sources, labels): (Vec<Source>, Vec<String>) = labelled.into_iter().unzip();
        tracing::info!(sources = sources.len(), "Fetching subscriptions");
        let outcomes = self.fetcher.fetch_all(sources).await;

        let mut inputs = Vec::new();

        // Outcomes come back in source order, which fixes namespacing and
        // rule precedence independently of download timing.
        for (label, outcome) in labels.into_iter().zip(outcomes) {
            match outcome {
                Ok((source, body)) => match self.parser.parse(&body) {
                    Ok(config) => inputs.push(MergeInput::new(label, config)),
                    Err(e) => {
                        tracing::warn!(source_id = %source.id, url = %source.url, %label, error = %e, "Dropping unparseable subscription");
                        failures.push(SourceFailure {
                            source_id: source.id,
                            url: source.url,
                            label,
                            stage: FailureStage::Parse,
                            reason: e.to_string(),
                        });
                    }
                },
                Err(e) => {
                    tracing::warn!(source_id = %e.source_id, url = %e.url, %label, error = %e.cause, "Dropping unreachable subscription");
                    failures.push(SourceFailure {
                        source_id: e.source_id,
                        url: e.url,
                        label,
                        stage: FailureStage::Fetch,
                        reason: e.cause.to_string(),
                    });
                }
            }
        }

        let merged_labels: Vec<String> = inputs.iter().map(|i| i.label.clone()).collect();
        let custom_rules = self.rules.list()?;

        let merged = self.engine.merge(inputs, &custom_rules).map_err(|e| {
            if matches!(e, MergeError::NoSources) {
                tracing::error!(failed = failures.len(), "No subscription could be fetched and parsed");
            }
            e
        })?;
        let document = merged.to_yaml().map_err(MergeError::from)?;

        let report = RunReport {
            merged: merged_labels,
            failures,
            proxies: merged.proxies.len(),
            proxy_groups: merged.proxy_groups.len(),
            rules: merged.rules.len(),
            version: None,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        Ok((document, report))
    }
}
