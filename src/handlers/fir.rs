// GET /fir/{fir_number}, /fir/{fir_number}/content, /list_firs

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::error::PipelineError;
use crate::middleware::validation::{validate_fir_number, validate_pagination};
use crate::state::AppState;

#[utoipa::path(get, path = "/fir/{fir_number}", responses((status = 200, description = "FIR metadata")))]
pub async fn get_fir(State(state): State<AppState>, Path(fir_number): Path<String>) -> Result<Json<serde_json::Value>, PipelineError> {
    validate_fir_number(&fir_number)?;
    let record = state
        .fir_store
        .get(&fir_number)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("fir {fir_number}")))?;

    Ok(Json(serde_json::json!({
        "fir_number": record.fir_number,
        "status": record.status,
        "created_at": record.created_at,
        "finalized_at": record.finalized_at,
    })))
}

#[utoipa::path(get, path = "/fir/{fir_number}/content", responses((status = 200, description = "FIR metadata and content")))]
pub async fn get_fir_content(
    State(state): State<AppState>,
    Path(fir_number): Path<String>,
) -> Result<Json<serde_json::Value>, PipelineError> {
    validate_fir_number(&fir_number)?;
    let record = state
        .fir_store
        .get(&fir_number)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("fir {fir_number}")))?;

    Ok(Json(serde_json::json!({
        "fir_number": record.fir_number,
        "status": record.status,
        "created_at": record.created_at,
        "finalized_at": record.finalized_at,
        "content": record.fir_content,
    })))
}

#[derive(serde::Deserialize, utoipa::IntoParams)]
pub struct ListFirsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[utoipa::path(get, path = "/list_firs", responses((status = 200, description = "Paginated FIR list")))]
pub async fn list_firs(
    State(state): State<AppState>,
    Query(query): Query<ListFirsQuery>,
) -> Result<Json<serde_json::Value>, PipelineError> {
    validate_pagination(query.limit, query.offset)?;
    let records = state.fir_store.list(query.limit, query.offset).await?;
    Ok(Json(serde_json::json!(records)))
}
