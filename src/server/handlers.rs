use axum::{
    extract::{Path, RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::SubmergeError;
use crate::domain::Source;
use crate::pipeline::RunReport;
use crate::scheduler::{LastRun, SchedulerState, Trigger};
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::store::result::{DOWNLOAD_FILENAME, MEDIA_TYPE};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub message: &'static str,
    pub version: &'static str,
    pub subscriptions: usize,
    pub scheduler: SchedulerState,
    pub result_version: Option<u64>,
}

#[derive(Deserialize)]
pub struct SubscriptionCreate {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub report: RunReport,
}

#[derive(Serialize)]
pub struct RefreshStatus {
    pub state: SchedulerState,
    pub interval_secs: u64,
    pub completed_runs: u64,
    pub last_run: Option<LastRun>,
}

#[derive(Serialize)]
pub struct RulesBody {
    pub rules: String,
}

#[derive(Serialize)]
pub struct RulesUpdated {
    pub message: &'static str,
    pub count: usize,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<SystemStatus>> {
    Ok(Json(SystemStatus {
        message: "Clash subscription merger is running",
        version: env!("CARGO_PKG_VERSION"),
        subscriptions: state.subscriptions.list()?.len(),
        scheduler: state.scheduler.state(),
        result_version: state.results.get().map(|p| p.version),
    }))
}

pub async fn add_subscription(
    State(state): State<AppState>,
    Json(body): Json<SubscriptionCreate>,
) -> ApiResult<Json<Source>> {
    let source = state.subscriptions.add(&body.url, body.name.as_deref())?;
    Ok(Json(source))
}

pub async fn remove_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Message>> {
    if state.subscriptions.delete(&id)?.is_none() {
        return Err(SubmergeError::SourceNotFound(id).into());
    }
    Ok(Json(Message {
        message: "Subscription removed",
    }))
}

pub async fn list_subscriptions(State(state): State<AppState>) -> ApiResult<Json<Vec<Source>>> {
    Ok(Json(state.subscriptions.list()?))
}

pub async fn get_result(State(state): State<AppState>) -> ApiResult<Response> {
    let published = state.results.get().ok_or_else(|| {
        ApiError::not_found("No merged config found. Please add subscriptions and refresh.")
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, attachment()),
            (header::ETAG, format!("\"{}\"", published.digest)),
        ],
        published.document.clone(),
    )
        .into_response())
}

pub async fn refresh(State(state): State<AppState>) -> ApiResult<Json<RefreshResponse>> {
    let report = state.scheduler.trigger(Trigger::Manual).await?;
    Ok(Json(RefreshResponse {
        message: "Refresh successful",
        report,
    }))
}

pub async fn refresh_status(State(state): State<AppState>) -> Json<RefreshStatus> {
    let scheduler = &state.scheduler;
    Json(RefreshStatus {
        state: scheduler.state(),
        interval_secs: scheduler.config().interval_secs,
        completed_runs: scheduler.completed_runs(),
        last_run: scheduler.last_run().map(|run| (*run).clone()),
    })
}

/// `GET /subscription/merge?urls=a&urls=b`
pub async fn merge_direct(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let urls = query_urls(query.as_deref());
    if urls.is_empty() {
        return Err(ApiError::bad_request("Missing required query parameter: urls"));
    }

    let (document, report) = state.pipeline.merge_urls(&urls).await?;
    tracing::info!(
        merged = report.merged.len(),
        failed = report.failures.len(),
        "Served ad-hoc merge"
    );

    Ok((
        [
            (header::CONTENT_TYPE, MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, attachment()),
        ],
        document,
    )
        .into_response())
}

pub async fn get_rules(State(state): State<AppState>) -> ApiResult<Json<RulesBody>> {
    Ok(Json(RulesBody {
        rules: state.rules.raw_lines()?.join("\n"),
    }))
}

pub async fn update_rules(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<RulesUpdated>> {
    let count = state.rules.replace_all(&body)?;
    Ok(Json(RulesUpdated {
        message: "Custom rules updated successfully",
        count,
    }))
}

fn attachment() -> String {
    format!("attachment; filename={}", DOWNLOAD_FILENAME)
}

/// Repeated `urls` parameters, in order.
fn query_urls(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, value)| key == "urls" && !value.trim().is_empty())
        .map(|(_, value)| value.into_owned())
        .collect()
}
