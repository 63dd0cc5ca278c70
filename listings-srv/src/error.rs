use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

/// Failures of the listings API, rendered as `{"error": "<code>"}`
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unsupported content type '{0}'")]
    InvalidContentType(String),
    #[error("uploads are not configured")]
    UploadsDisabled,
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "not_found",
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::InvalidQuery(_) => "invalid_query",
            ApiError::InvalidContentType(_) => "invalid_content_type",
            ApiError::UploadsDisabled => "uploads_disabled",
            ApiError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidJson(_)
            | ApiError::InvalidQuery(_)
            | ApiError::InvalidContentType(_) => StatusCode::BAD_REQUEST,
            ApiError::UploadsDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(err) => error!("API error: {err:?}"),
            ApiError::NotFound => {}
            other => warn!("rejected request: {other}"),
        }
        // Only the code goes back to the caller
        (self.status(), Json(serde_json::json!({ "error": self.code() }))).into_response()
    }
}
