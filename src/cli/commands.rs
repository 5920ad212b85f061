use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::app::{AppContext, Result, SubmergeError};
use crate::domain::CustomRule;
use crate::pipeline::RunReport;
use crate::scheduler::{SchedulerConfig, Trigger};
use crate::server;
use crate::store::UpsertOutcome;

pub fn add_subscription(ctx: &AppContext, url: &str, name: Option<&str>) -> Result<()> {
    let source = ctx.subscriptions.add(url, name)?;
    println!("Added subscription: {}", source.display_name());
    println!("  id: {}", source.id);
    Ok(())
}

pub fn remove_subscription(ctx: &AppContext, id: &str) -> Result<()> {
    let source = ctx
        .subscriptions
        .delete(id)?
        .ok_or_else(|| SubmergeError::SourceNotFound(id.to_string()))?;
    println!("Removed subscription: {} ({})", source.display_name(), source.id);
    Ok(())
}

pub fn list_subscriptions(ctx: &AppContext) -> Result<()> {
    let sources = ctx.subscriptions.list()?;

    if sources.is_empty() {
        println!("No subscriptions");
        return Ok(());
    }

    for (i, source) in sources.iter().enumerate() {
        println!(
            "{} [{}]\n  {}\n  id: {}",
            source.display_name(),
            source.label(i + 1),
            source.url,
            source.id
        );
    }

    Ok(())
}

pub async fn refresh(ctx: &AppContext) -> Result<()> {
    let sources = ctx.subscriptions.list()?.len();
    println!("Refreshing {} subscriptions...", sources);

    let report = ctx.scheduler.trigger(Trigger::Manual).await?;
    print_report(&report);
    if let Some(version) = report.version {
        println!("Published version {}", version);
    }
    Ok(())
}

pub async fn merge_urls(ctx: &AppContext, urls: &[String], output: Option<&Path>) -> Result<()> {
    let (document, report) = ctx.pipeline.merge_urls(urls).await?;
    for failure in &report.failures {
        eprintln!("  Skipped {}: {}", failure.url, failure.reason);
    }
    write_document(&document, output)
}

pub fn show_result(ctx: &AppContext, output: Option<&Path>) -> Result<()> {
    match ctx.results.get() {
        Some(published) => write_document(&published.document, output),
        None => {
            println!("No merged config yet. Add subscriptions and run `submerge refresh`.");
            Ok(())
        }
    }
}

pub fn show_rules(ctx: &AppContext) -> Result<()> {
    let lines = ctx.rules.raw_lines()?;
    if lines.is_empty() {
        println!("No custom rules");
        return Ok(());
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

pub fn set_rules(ctx: &AppContext, path: &Path) -> Result<()> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(path)?
    };

    let count = ctx.rules.replace_all(&text)?;
    println!("Stored {} custom rules", count);
    Ok(())
}

pub fn add_rule(ctx: &AppContext, line: &str) -> Result<()> {
    let rule: CustomRule = line.parse()?;
    let rendered = rule.line().to_string();

    match ctx.rules.upsert(rule)? {
        UpsertOutcome::Inserted => println!("Added rule: {}", rendered),
        UpsertOutcome::Replaced => println!("Replaced rule: {}", rendered),
        UpsertOutcome::Unchanged => println!("Rule already present: {}", rendered),
    }
    Ok(())
}

/// Run the API and the scheduler until Ctrl+C.
pub async fn serve(ctx: Arc<AppContext>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    println!(
        "Serving on http://{} (refresh every {})",
        listener.local_addr()?,
        SchedulerConfig::format_interval(ctx.scheduler.config().interval_secs)
    );

    let scheduler = tokio::spawn(ctx.scheduler.clone().run(shutdown_rx));

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    server::run(ctx, listener, shutdown).await?;

    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for failure in &report.failures {
        eprintln!(
            "  Error in {} ({:?}): {}",
            failure.label, failure.stage, failure.reason
        );
    }
    println!(
        "Merged {} of {} subscriptions: {} proxies, {} groups, {} rules ({} ms)",
        report.merged.len(),
        report.merged.len() + report.failures.len(),
        report.proxies,
        report.proxy_groups,
        report.rules,
        report.elapsed_ms
    );
}

fn write_document(document: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, document)?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", document),
    }
    Ok(())
}
