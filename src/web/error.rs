use crate::query::QueryError;
use crate::registry::RegistryError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    InvalidQuerySyntax(#[from] QueryError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("device '{0}' not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    UpstreamUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidQuerySyntax(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidQuerySyntax(_) => "InvalidQuerySyntax",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Upstream(_) => "Upstream",
            ApiError::UpstreamUnavailable(_) => "UpstreamUnavailable",
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound { id } => ApiError::NotFound(id),
            RegistryError::Conflict(_) => ApiError::Conflict(error.to_string()),
            RegistryError::InvalidContinuationToken(_) => ApiError::BadRequest(error.to_string()),
            RegistryError::Unavailable(_) => ApiError::UpstreamUnavailable(error.to_string()),
            RegistryError::Upstream { .. } | RegistryError::InvalidResponse(_) => ApiError::Upstream(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorApiModel {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status_code = %status, "⚠️ {}", self);
        }

        let body = ErrorApiModel {
            code: self.code().to_string(),
            message: self.to_string(),
            input: match &self {
                ApiError::InvalidQuerySyntax(error) => Some(error.input().to_string()),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}
