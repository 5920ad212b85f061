//! HTTP API.
//!
//! Thin axum layer over [`AppContext`]: every handler delegates to a store,
//! the pipeline or the scheduler and maps [`SubmergeError`](crate::app::SubmergeError)
//! to a status code.

pub mod error;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::AppContext;
use self::handlers::*;

pub use error::ApiError;

/// Application state injected into handlers.
pub type AppState = Arc<AppContext>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_status))
        .route("/subscription", post(add_subscription))
        .route("/subscription/list", get(list_subscriptions))
        .route("/subscription/result", get(get_result))
        .route("/subscription/refresh", post(refresh))
        .route("/subscription/status", get(refresh_status))
        .route("/subscription/merge", get(merge_direct))
        .route("/subscription/{id}", delete(remove_subscription))
        .route("/rules", get(get_rules))
        .route("/rules/update", post(update_rules))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn run<F>(state: AppState, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
