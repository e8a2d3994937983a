// Requires X-API-Key or a Bearer token, compared in constant time. Public
// paths (health, docs) are mounted outside this layer entirely, mirroring
// the teacher's public/protected router split.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::PipelineError;
use crate::middleware::rate_limit::derive_ip;
use crate::secrets::constant_time_eq;
use crate::state::AppState;

pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, PipelineError> {
    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        });

    let expected = state.secrets.get_or("API_KEY", &state.config.api_key).await;

    match presented {
        Some(token) if constant_time_eq(&token, &expected) => Ok(next.run(request).await),
        _ => {
            let ip = derive_ip(&request);
            let path = request.uri().path().to_string();
            tracing::warn!(%path, "auth: missing or invalid API key");
            crate::persistence::fir_store::log_audit(
                state.fir_store.pool(),
                "auth_failed",
                serde_json::json!({ "path": path }),
                ip.map(|ip| ip.to_string()).as_deref(),
            )
            .await;
            Err(PipelineError::Unauthorized)
        }
    }
}
