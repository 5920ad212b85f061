use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::app::SubmergeError;
use crate::merger::MergeError;

/// An error rendered as `{"detail": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<SubmergeError> for ApiError {
    fn from(err: SubmergeError) -> Self {
        let status = match &err {
            SubmergeError::RefreshInProgress => StatusCode::CONFLICT,
            SubmergeError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            SubmergeError::NoSubscriptions
            | SubmergeError::InvalidUrl(_)
            | SubmergeError::Parse(_)
            | SubmergeError::Merge(MergeError::NoSources) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = match &err {
            SubmergeError::Merge(MergeError::NoSources) => {
                "Failed to fetch any valid subscriptions".to_string()
            }
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self { status, detail }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}
