// Rejects new requests with 503 while the process is draining; otherwise
// tracks the request as in-flight for the duration of the handler.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::PipelineError;
use crate::state::AppState;

pub async fn shutdown_gate(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, PipelineError> {
    let Some(_guard) = state.reliability.shutdown.enter() else {
        return Err(PipelineError::Shutdown);
    };
    Ok(next.run(request).await)
}
