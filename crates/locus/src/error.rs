//! API error taxonomy and its HTTP rendering.
//!
//! Validation and auth failures never reach storage; storage failures
//! reach the client only as a status (503 with a retry hint when the
//! error class is transient, 500 otherwise). Invariant violations
//! detected in stored data fail closed as 503.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use locus_db::DbError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("no location could be estimated based on the data provided")]
    NoCoverage,

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NoCoverage => StatusCode::NOT_FOUND,
            Self::Storage(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(DbError::InvalidState(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid request",
            Self::Unauthorized => "unauthorized",
            Self::NoCoverage => "not found",
            Self::Storage(e) if e.is_transient() => "temporarily unavailable",
            Self::Storage(_) => "internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            // no body detail on auth failures
            ApiError::Unauthorized => return status.into_response(),
            ApiError::Storage(e) if e.is_transient() => {
                warn!(error = %e, "Transient storage error surfaced to client");
            }
            ApiError::Storage(e) => {
                error!(error = %e, "Storage error surfaced to client");
            }
            _ => {}
        }

        let message = match &self {
            // internal detail stays in the logs
            ApiError::Storage(_) => String::new(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "domain": "locate",
                "reason": self.reason(),
                "message": message,
                "code": status.as_u16(),
            }
        }));

        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [("retry-after", "2")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
