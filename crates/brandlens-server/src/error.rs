use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

pub fn to_env_var(field: &str) -> String {
    format!("BRANDLENS_{}", field.replace('.', "__").to_uppercase())
}

/// Wire error codes shared with callers.
pub struct ErrorCode {
    pub code: &'static str,
    pub message: &'static str,
    pub retryable: bool,
}

impl ErrorCode {
    pub fn body(&self) -> Value {
        json!({
            "code": self.code,
            "message": self.message,
            "retryable": self.retryable,
        })
    }
}

// Part of the wire contract even where the server never produces them yet:
// processing timeouts are declared in settings but not enforced.
#[allow(dead_code)]
pub const TIMEOUT_408: ErrorCode = ErrorCode {
    code: "TIMEOUT_408",
    message: "Processing timeout",
    retryable: true,
};

pub const BAD_REQUEST_400: ErrorCode = ErrorCode {
    code: "BAD_REQUEST_400",
    message: "Bad request format",
    retryable: false,
};

pub const INTERNAL_ERROR_500: ErrorCode = ErrorCode {
    code: "INTERNAL_ERROR_500",
    message: "Internal server error",
    retryable: true,
};

#[allow(dead_code)]
pub const INTERRUPT_FAILED_409: ErrorCode = ErrorCode {
    code: "INTERRUPT_FAILED_409",
    message: "Failed to interrupt the task",
    retryable: true,
};

/// Failures surfaced by the non-streaming endpoints. Streaming endpoints
/// report failures as error events on the open stream instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request")]
    BadRequest,

    #[error("internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        ApiError::Internal(anyhow::anyhow!("{}", error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest => {
                (StatusCode::BAD_REQUEST, Json(BAD_REQUEST_400.body())).into_response()
            }
            ApiError::Internal(error) => {
                tracing::error!(%error, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(INTERNAL_ERROR_500.body()),
                )
                    .into_response()
            }
        }
    }
}
