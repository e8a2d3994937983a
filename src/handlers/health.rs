// GET /health (public), /reliability, reset/trigger operator endpoints,
// and the 10s-cached /metrics snapshot.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::PipelineError;
use crate::state::AppState;

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Aggregate health")))]
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let dependencies = state.reliability.health_snapshot().await;
    let all_healthy = dependencies.iter().all(|d| d.healthy);
    let any_healthy = dependencies.iter().any(|d| d.healthy);
    let status = if dependencies.is_empty() || all_healthy {
        "healthy"
    } else if any_healthy {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(serde_json::json!({
        "status": status,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "dependencies": dependencies,
    }))
}

pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let ready = state.is_ready();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(serde_json::json!({ "ready": ready })))
}

#[utoipa::path(get, path = "/reliability", responses((status = 200, description = "Reliability snapshot")))]
pub async fn reliability(State(state): State<AppState>) -> Json<serde_json::Value> {
    let breakers = state.reliability.breaker_snapshots().await;
    let recovery = state.reliability.recovery.snapshot().await;
    let health = state.reliability.health_snapshot().await;
    Json(serde_json::json!({
        "circuit_breakers": breakers,
        "auto_recovery": recovery.into_iter().map(|(name, status)| serde_json::json!({ "name": name, "status": status })).collect::<Vec<_>>(),
        "health": health,
        "shutting_down": state.reliability.shutdown.is_shutting_down(),
    }))
}

#[utoipa::path(
    post,
    path = "/reliability/circuit-breaker/{name}/reset",
    responses((status = 200, description = "Breaker reset"), (status = 400, description = "Unknown breaker name"))
)]
pub async fn reset_circuit_breaker(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<serde_json::Value>, PipelineError> {
    let breaker = state
        .reliability
        .breaker(&name)
        .ok_or_else(|| PipelineError::InvalidInput(format!("unknown dependency: {name}")))?;
    breaker.reset().await;
    Ok(Json(serde_json::json!({ "name": name, "state": "closed" })))
}

#[utoipa::path(
    post,
    path = "/reliability/auto-recovery/{name}/trigger",
    responses((status = 200, description = "Recovery cycle triggered"))
)]
pub async fn trigger_auto_recovery(State(state): State<AppState>, Path(name): Path<String>) -> Json<serde_json::Value> {
    let success = state.reliability.recovery.trigger(&name).await;
    let status = state.reliability.recovery.status(&name).await;
    Json(serde_json::json!({ "success": success, "status": status }))
}

/// Snapshot of process metrics, cached for 10s so a scraper hammering this
/// endpoint doesn't pay for a fresh breaker snapshot on every call.
pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    if let Some(cached) = state.metrics_cache.get(&()).await {
        return Json((*cached).clone());
    }

    let breakers = state.reliability.breaker_snapshots().await;
    let open_count = breakers
        .iter()
        .filter(|b| matches!(b.state, crate::reliability::circuit_breaker::BreakerState::Open))
        .count();
    let uptime = state.start_time.elapsed().as_secs();

    let snapshot = serde_json::json!({
        "uptime_seconds": uptime,
        "circuit_breakers_open": open_count,
        "circuit_breakers_total": breakers.len(),
    });
    state.metrics_cache.insert((), std::sync::Arc::new(snapshot.clone())).await;
    Json(snapshot)
}
