use std::sync::Arc;

use crate::app::error::{Result, SubmergeError};
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::Fetcher;
use crate::merger::MergeEngine;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::store::{
    JsonSubscriptionStore, ResultStore, RuleStore, SubscriptionStore, TextRuleStore,
};

pub const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";
pub const CUSTOM_RULES_FILE: &str = "custom_rules.txt";
pub const RESULT_FILE: &str = "merged.yaml";

pub struct AppContext {
    pub config: Config,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub rules: Arc<dyn RuleStore>,
    pub results: Arc<ResultStore>,
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<Scheduler>,
}

impl AppContext {
    /// Open the file-backed stores under the configured data directory.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch.timeout(), &config.fetch.user_agent)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        let data_dir = config
            .storage
            .resolve_data_dir()
            .map_err(|e| SubmergeError::Config(e.to_string()))?;
        std::fs::create_dir_all(&data_dir)?;
        tracing::debug!(data_dir = %data_dir.display(), "Opening stores");

        let subscriptions = Arc::new(JsonSubscriptionStore::open(data_dir.join(SUBSCRIPTIONS_FILE))?);
        let rules = Arc::new(TextRuleStore::open(data_dir.join(CUSTOM_RULES_FILE))?);
        let results = Arc::new(ResultStore::open(data_dir.join(RESULT_FILE))?);

        Self::assemble(config, subscriptions, rules, results, fetcher)
    }

    /// Everything in memory; nothing touches the filesystem.
    pub fn in_memory(config: Config, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        Self::assemble(
            config,
            Arc::new(JsonSubscriptionStore::in_memory()),
            Arc::new(TextRuleStore::in_memory()),
            Arc::new(ResultStore::in_memory()),
            fetcher,
        )
    }

    fn assemble(
        config: Config,
        subscriptions: Arc<dyn SubscriptionStore>,
        rules: Arc<dyn RuleStore>,
        results: Arc<ResultStore>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
    ) -> Result<Self> {
        let scheduler_config = config
            .scheduler
            .to_scheduler_config()
            .map_err(|e| SubmergeError::Config(e.to_string()))?;

        let parallel_fetcher =
            ParallelFetcher::with_workers(fetcher, config.fetch.workers, config.fetch.timeout());
        let pipeline = Arc::new(Pipeline::new(
            subscriptions.clone(),
            rules.clone(),
            results.clone(),
            parallel_fetcher,
            MergeEngine::new(config.merge),
        ));
        let scheduler = Arc::new(Scheduler::new(pipeline.clone(), scheduler_config));

        Ok(Self {
            config,
            subscriptions,
            rules,
            results,
            pipeline,
            scheduler,
        })
    }
}
