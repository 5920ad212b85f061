//! # submerge
//!
//! Merges several Clash proxy subscriptions into one Clash configuration.
//!
//! ## Architecture
//!
//! submerge follows the same pipeline on every refresh:
//!
//! ```text
//! Fetcher → ConfigParser → MergeEngine → ResultStore
//! ```
//!
//! - [`fetcher`]: concurrent HTTP downloads with per-request timeouts
//! - [`parser`]: Clash YAML into proxies, groups and rules
//! - [`merger`]: namespacing, rule rewriting and deduplication
//! - [`store`]: subscriptions, custom rules and the published result
//!
//! ## Quick Start
//!
//! ```bash
//! # Add subscriptions
//! submerge add https://provider-a.example/clash --name A
//! submerge add https://provider-b.example/clash --name B
//!
//! # Merge once and print the result
//! submerge refresh
//! submerge result
//!
//! # Serve the HTTP API, refreshing every 10 minutes
//! submerge serve
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// stores, pipeline, scheduler.
pub mod app;

/// Command-line interface using clap.
///
/// - `serve` - Run the HTTP API and the periodic refresh
/// - `add <url> [--name]` / `remove <id>` / `list` - Manage subscriptions
/// - `refresh` - Merge every subscription now
/// - `merge <url>...` - One-off merge without saving
/// - `result` - Print the last merged config
/// - `rules show|set|add` - Manage custom rules
pub mod cli;

/// Configuration loaded from `~/.config/submerge/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Source`](domain::Source): a registered subscription
/// - [`Rule`](domain::Rule): one Clash routing rule
/// - [`ParsedConfig`](domain::ParsedConfig) / [`MergedConfig`](domain::MergedConfig)
pub mod domain;

/// Subscription downloads.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for fetching one URL
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): Concurrent fetching with semaphore
pub mod fetcher;

/// Combines parsed subscriptions and custom rules into one document.
pub mod merger;

/// Clash YAML and rule-line parsing.
pub mod parser;

/// One refresh run: fetch, parse, merge, publish.
pub mod pipeline;

/// Single-flight refresh state machine and interval loop.
pub mod scheduler;

/// HTTP API built with axum.
pub mod server;

/// File-backed persistence for subscriptions, custom rules and the result.
pub mod store;

#[cfg(test)]
mod testing;
