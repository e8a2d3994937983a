// Crate-wide error type. Internal code propagates `PipelineError` with `?`;
// only the HTTP boundary translates it into a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("wrong step: expected {expected}, session is at {actual}")]
    WrongStep { expected: String, actual: String },

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("timeout")]
    Timeout,

    #[error("empty response from upstream")]
    EmptyResponse,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("server is shutting down")]
    Shutdown,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::Unauthorized => StatusCode::UNAUTHORIZED,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::WrongStep { .. } => StatusCode::CONFLICT,
            PipelineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::EmptyResponse => StatusCode::BAD_GATEWAY,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Unauthorized => "unauthorized",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::WrongStep { .. } => "wrong_step",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::CircuitOpen(_) => "circuit_open",
            PipelineError::Timeout => "timeout",
            PipelineError::EmptyResponse => "empty_response",
            PipelineError::Internal(_) => "internal",
            PipelineError::Shutdown => "shutdown",
            PipelineError::PayloadTooLarge => "payload_too_large",
            PipelineError::UnsupportedMediaType(_) => "unsupported_media_type",
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", self);
        } else {
            tracing::warn!(kind = self.kind(), "{}", self);
        }

        let mut response = (
            status,
            Json(json!({
                "error": self.kind(),
                "message": self.to_string(),
            })),
        )
            .into_response();

        if let PipelineError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}
