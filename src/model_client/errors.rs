use crate::error::PipelineError;

/// Translates a `reqwest` failure into the crate's error taxonomy.
pub fn classify_reqwest_error(err: &reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout
    } else {
        PipelineError::Internal(err.to_string())
    }
}

pub fn classify_status(status: reqwest::StatusCode) -> Option<PipelineError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Some(PipelineError::RateLimited { retry_after_secs: 5 })
    } else if status.is_server_error() {
        Some(PipelineError::Internal(format!("upstream returned {status}")))
    } else if !status.is_success() {
        Some(PipelineError::Internal(format!("upstream returned {status}")))
    } else {
        None
    }
}

pub fn is_retryable(err: &PipelineError) -> bool {
    matches!(err, PipelineError::Timeout | PipelineError::Internal(_) | PipelineError::EmptyResponse)
}
