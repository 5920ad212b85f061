//! Periodic and on-demand refresh of the merged document.
//!
//! The scheduler is a two-state machine, idle and running. Timer ticks and
//! manual requests both try to move it from idle to running; a trigger that
//! finds it running is rejected with [`SubmergeError::RefreshInProgress`]
//! instead of queueing, so at most one pipeline run is ever in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::app::{Result, SubmergeError};
use crate::pipeline::{Pipeline, RunReport};

pub const DEFAULT_INTERVAL_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Refresh interval in seconds (default: 600 = 10 minutes)
    pub interval_secs: u64,
    /// Whether to refresh immediately on start
    pub refresh_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            refresh_on_start: true,
        }
    }
}

impl SchedulerConfig {
    /// Parse interval string like "10m", "1h", "90s", "1d" or raw seconds.
    pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
        let s = s.trim().to_lowercase();

        let secs = if let Some(hours) = s.strip_suffix('h') {
            scaled(hours, 3600, "hours")?
        } else if let Some(minutes) = s.strip_suffix('m') {
            scaled(minutes, 60, "minutes")?
        } else if let Some(days) = s.strip_suffix('d') {
            scaled(days, 86400, "days")?
        } else if let Some(secs) = s.strip_suffix('s') {
            scaled(secs, 1, "seconds")?
        } else {
            s.parse::<u64>()
                .map_err(|_| format!("Invalid interval: {}. Use format like '10m', '1h', '1d'", s))?
        };

        if secs == 0 {
            return Err("Interval must be greater than zero".to_string());
        }
        Ok(secs)
    }

    /// Format interval for display
    pub fn format_interval(secs: u64) -> String {
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn scaled(amount: &str, unit_secs: u64, unit: &str) -> std::result::Result<u64, String> {
    let amount = amount
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, amount))?;
    amount
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("Interval too large: {} {}", amount, unit))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Startup,
    Timer,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Outcome of the most recent finished run.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub trigger: Trigger,
    pub finished_at: DateTime<Utc>,
    pub report: Option<RunReport>,
    pub error: Option<String>,
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    completed_runs: AtomicU64,
    last_run: ArcSwapOption<LastRun>,
}

/// Holds the running flag; dropping it returns the scheduler to idle, also
/// when the run errors or panics.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            running: Arc::new(AtomicBool::new(false)),
            completed_runs: AtomicU64::new(0),
            last_run: ArcSwapOption::empty(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Number of pipeline runs that have finished, successfully or not.
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::Acquire)
    }

    pub fn last_run(&self) -> Option<Arc<LastRun>> {
        self.last_run.load_full()
    }

    /// Run the pipeline now unless a run is already in flight.
    ///
    /// The run itself is a spawned task: dropping the returned future (an
    /// HTTP client hanging up, say) stops the wait, not the refresh, and the
    /// outcome is still recorded in [`last_run`](Self::last_run).
    pub async fn trigger(self: &Arc<Self>, trigger: Trigger) -> Result<RunReport> {
        let guard = RunGuard::acquire(&self.running).ok_or(SubmergeError::RefreshInProgress)?;

        let scheduler = Arc::clone(self);
        let run = tokio::spawn(async move {
            let _guard = guard;
            scheduler.execute(trigger).await
        });
        run.await?
    }

    async fn execute(&self, trigger: Trigger) -> Result<RunReport> {
        tracing::info!(?trigger, "Starting subscription refresh");
        let result = self.pipeline.refresh().await;

        let (report, error) = match &result {
            Ok(report) => (Some(report.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        self.last_run.store(Some(Arc::new(LastRun {
            trigger,
            finished_at: Utc::now(),
            report,
            error,
        })));
        self.completed_runs.fetch_add(1, Ordering::AcqRel);

        result
    }

    /// Drive timer-based refreshes until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = %SchedulerConfig::format_interval(self.config.interval_secs),
            "Scheduler started"
        );

        if self.config.refresh_on_start {
            self.tick(Trigger::Startup).await;
        }

        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Trigger::Timer).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn tick(self: &Arc<Self>, trigger: Trigger) {
        match self.trigger(trigger).await {
            Ok(report) => tracing::info!(
                merged = report.merged.len(),
                failed = report.failures.len(),
                proxies = report.proxies,
                rules = report.rules,
                version = ?report.version,
                elapsed_ms = report.elapsed_ms,
                "Refresh complete"
            ),
            Err(SubmergeError::RefreshInProgress) => {
                tracing::debug!(?trigger, "Refresh already running, skipping tick")
            }
            Err(SubmergeError::NoSubscriptions) => {
                tracing::info!("No subscriptions to refresh")
            }
            Err(e) => tracing::error!(error = %e, "Scheduled refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::parallel::ParallelFetcher;
    use crate::merger::MergeEngine;
    use crate::store::{JsonSubscriptionStore, ResultStore, SubscriptionStore, TextRuleStore};
    use crate::testing::{sample_config, StaticFetcher};
    use tokio::sync::Semaphore;

    fn scheduler_with(fetcher: StaticFetcher, urls: &[&str]) -> (Arc<Scheduler>, Arc<ResultStore>) {
        let subscriptions = Arc::new(JsonSubscriptionStore::in_memory());
        for url in urls {
            subscriptions.add(url, None).unwrap();
        }
        let results = Arc::new(ResultStore::in_memory());
        let pipeline = Pipeline::new(
            subscriptions,
            Arc::new(TextRuleStore::in_memory()),
            results.clone(),
            ParallelFetcher::new(Arc::new(fetcher)),
            MergeEngine::default(),
        );
        let scheduler = Arc::new(Scheduler::new(Arc::new(pipeline), SchedulerConfig::default()));
        (scheduler, results)
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(SchedulerConfig::parse_interval("10m").unwrap(), 600);
        assert_eq!(SchedulerConfig::parse_interval("1h").unwrap(), 3600);
        assert_eq!(SchedulerConfig::parse_interval("1d").unwrap(), 86400);
        assert_eq!(SchedulerConfig::parse_interval("90s").unwrap(), 90);
        assert_eq!(SchedulerConfig::parse_interval("600").unwrap(), 600);
        assert!(SchedulerConfig::parse_interval("0m").is_err());
        assert!(SchedulerConfig::parse_interval("soon").is_err());
    }

    #[test]
    fn test_parse_interval_rejects_overflow() {
        let err = SchedulerConfig::parse_interval("99999999999999999d").unwrap_err();
        assert!(err.contains("too large"));
        assert!(SchedulerConfig::parse_interval("18446744073709551615h").is_err());
        assert_eq!(
            SchedulerConfig::parse_interval("18446744073709551615s").unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(SchedulerConfig::format_interval(600), "10m");
        assert_eq!(SchedulerConfig::format_interval(3600), "1h");
        assert_eq!(SchedulerConfig::format_interval(86400), "1d");
        assert_eq!(SchedulerConfig::format_interval(90), "90s");
    }

    #[test]
    fn test_default_interval_is_ten_minutes() {
        assert_eq!(SchedulerConfig::default().interval(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_manual_trigger_while_running_is_rejected() {
        let url = "https://one.example/sub";
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = StaticFetcher::new()
            .with(url, &sample_config("P1", "example.com"))
            .with_gate(gate.clone());
        let entered = fetcher.entered();
        let calls = fetcher.calls();
        let (scheduler, results) = scheduler_with(fetcher, &[url]);

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger(Trigger::Timer).await })
        };
        entered.notified().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let manual = scheduler.trigger(Trigger::Manual).await;
        assert!(matches!(manual, Err(SubmergeError::RefreshInProgress)));

        gate.add_permits(1);
        let report = background.await.unwrap().unwrap();

        assert_eq!(report.version, Some(1));
        assert_eq!(scheduler.completed_runs(), 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(results.get().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_failed_run_returns_to_idle_and_is_recorded() {
        let (scheduler, results) = scheduler_with(StaticFetcher::new(), &["https://down.example/sub"]);

        assert!(scheduler.trigger(Trigger::Manual).await.is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(results.get().is_none());

        let last = scheduler.last_run().unwrap();
        assert_eq!(last.trigger, Trigger::Manual);
        assert!(last.error.is_some());

        // the next trigger is accepted again
        assert!(!matches!(
            scheduler.trigger(Trigger::Timer).await,
            Err(SubmergeError::RefreshInProgress)
        ));
        assert_eq!(scheduler.completed_runs(), 2);
    }

    #[tokio::test]
    async fn test_run_loop_refreshes_on_start_and_stops_on_shutdown() {
        let url = "https://one.example/sub";
        let fetcher = StaticFetcher::new().with(url, &sample_config("P1", "example.com"));
        let (scheduler, results) = scheduler_with(fetcher, &[url]);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.clone().run(rx));

        while scheduler.completed_runs() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(results.get().unwrap().version, 1);
        assert_eq!(scheduler.completed_runs(), 1);
    }

    #[tokio::test]
    async fn test_run_completes_when_caller_is_dropped() {
        let url = "https://one.example/sub";
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = StaticFetcher::new()
            .with(url, &sample_config("P1", "example.com"))
            .with_gate(gate.clone());
        let (scheduler, results) = scheduler_with(fetcher, &[url]);

        let waited =
            tokio::time::timeout(Duration::from_millis(50), scheduler.trigger(Trigger::Manual)).await;
        assert!(waited.is_err());
        assert_eq!(scheduler.state(), SchedulerState::Running);

        gate.add_permits(1);
        while scheduler.completed_runs() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let last = scheduler.last_run().unwrap();
        assert_eq!(last.trigger, Trigger::Manual);
        assert_eq!(last.report.as_ref().unwrap().version, Some(1));
        assert_eq!(results.get().unwrap().version, 1);

        // the guard is released by the spawned run, not the dropped caller
        while scheduler.state() == SchedulerState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!matches!(
            scheduler.trigger(Trigger::Timer).await,
            Err(SubmergeError::RefreshInProgress)
        ));
    }
}
