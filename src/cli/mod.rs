pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "submerge")]
#[command(about = "Merge Clash subscriptions into one config", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/submerge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for subscriptions, custom rules and the merged result
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Cap on concurrent subscription downloads (0 = no cap)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the periodic refresh
    Serve {
        /// Address to listen on, e.g. "0.0.0.0:8000"
        #[arg(short, long)]
        bind: Option<String>,

        /// Refresh interval (e.g., "10m", "1h", "1d")
        #[arg(short, long)]
        interval: Option<String>,

        /// Skip the refresh on start
        #[arg(long)]
        no_initial_refresh: bool,
    },
    /// Add a subscription
    Add {
        /// URL of the subscription
        url: String,

        /// Label used to prefix this subscription's proxies
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Remove a subscription by id
    Remove {
        /// Id shown by `list`
        id: String,
    },
    /// List subscriptions
    List,
    /// Fetch and merge every subscription now
    Refresh,
    /// Merge the given URLs once without saving anything
    Merge {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the last merged config
    Result {
        /// Write the document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage custom rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// Print the custom rules
    Show,
    /// Replace all custom rules with the contents of a file ("-" for stdin)
    Set {
        path: PathBuf,
    },
    /// Add one rule, replacing any rule with the same type and value
    Add {
        /// e.g. "DOMAIN-SUFFIX,example.com,DIRECT"
        rule: String,
    },
}
