use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use submerge::app::AppContext;
use submerge::cli::{commands, Cli, Commands, RulesAction};
use submerge::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("submerge=info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }
    if let Some(workers) = cli.workers {
        config.fetch.workers = workers;
    }
    if let Commands::Serve {
        bind,
        interval,
        no_initial_refresh,
    } = &cli.command
    {
        if let Some(bind) = bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(interval) = interval {
            config.scheduler.interval = interval.clone();
        }
        if *no_initial_refresh {
            config.scheduler.refresh_on_start = false;
        }
        config.validate()?;
    }

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Serve { .. } => {
            let bind = ctx.config.server.bind_address.clone();
            commands::serve(Arc::new(ctx), &bind).await?;
        }
        Commands::Add { url, name } => {
            commands::add_subscription(&ctx, &url, name.as_deref())?;
        }
        Commands::Remove { id } => {
            commands::remove_subscription(&ctx, &id)?;
        }
        Commands::List => {
            commands::list_subscriptions(&ctx)?;
        }
        Commands::Refresh => {
            commands::refresh(&ctx).await?;
        }
        Commands::Merge { urls, output } => {
            commands::merge_urls(&ctx, &urls, output.as_deref()).await?;
        }
        Commands::Result { output } => {
            commands::show_result(&ctx, output.as_deref())?;
        }
        Commands::Rules { action } => match action {
            RulesAction::Show => commands::show_rules(&ctx)?,
            RulesAction::Set { path } => commands::set_rules(&ctx, &path)?,
            RulesAction::Add { rule } => commands::add_rule(&ctx, &rule)?,
        },
    }

    Ok(())
}
