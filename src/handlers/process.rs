// POST /process, /validate, /regenerate/{session_id}, /session/{id}/status

use axum::extract::{Multipart, Path, State};
use axum::Json;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::middleware::validation::{validate_session_id, validate_text, validate_upload};
use crate::orchestrator::ComplaintInput;
use crate::state::AppState;

#[utoipa::path(post, path = "/process", responses((status = 200, description = "Pipeline started")))]
pub async fn process(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<serde_json::Value>, PipelineError> {
    let mut text: Option<String> = None;
    let mut audio: Option<bytes::Bytes> = None;
    let mut image: Option<bytes::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        let content_type = field.content_type().unwrap_or("").to_string();
        match name.as_str() {
            "text" => {
                let value = field.text().await.map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
                validate_text(&value, 10, 50_000)?;
                text = Some(value);
            }
            "audio" => {
                let data = field.bytes().await.map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
                validate_upload(data.len(), &content_type)?;
                audio = Some(data);
            }
            "image" => {
                let data = field.bytes().await.map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
                validate_upload(data.len(), &content_type)?;
                image = Some(data);
            }
            _ => {}
        }
    }

    let input = ComplaintInput::from_fields(text, audio, image)?;
    let outcome = state.orchestrator.process(input).await?;
    Ok(Json(serde_json::to_value(outcome).map_err(|e| PipelineError::Internal(e.to_string()))?))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct ValidateRequest {
    pub session_id: Uuid,
    pub approved: bool,
    #[serde(default)]
    pub user_input: Option<String>,
}

#[utoipa::path(post, path = "/validate", responses((status = 200, description = "Step validated")))]
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<serde_json::Value>, PipelineError> {
    if let Some(input) = &request.user_input {
        validate_text(input, 1, 10_000)?;
    }
    let outcome = state
        .orchestrator
        .validate(request.session_id, request.approved, request.user_input)
        .await?;
    Ok(Json(serde_json::to_value(outcome).map_err(|e| PipelineError::Internal(e.to_string()))?))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub user_input: Option<String>,
}

#[utoipa::path(post, path = "/regenerate/{session_id}", responses((status = 200, description = "Step regenerated")))]
pub async fn regenerate(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<serde_json::Value>, PipelineError> {
    let session_id = validate_session_id(&session_id)?;
    if let Some(input) = &request.user_input {
        validate_text(input, 1, 10_000)?;
    }
    let outcome = state.orchestrator.regenerate(session_id, request.user_input).await?;
    Ok(Json(serde_json::to_value(outcome).map_err(|e| PipelineError::Internal(e.to_string()))?))
}

#[utoipa::path(get, path = "/session/{session_id}/status", responses((status = 200, description = "Session status")))]
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, PipelineError> {
    let session_id = validate_session_id(&session_id)?;
    let session = state.orchestrator.status(session_id).await?;
    Ok(Json(serde_json::json!({
        "status": session.status.as_str(),
        "current_step": session.state.current_validation_step.as_str(),
        "awaiting_validation": session.state.awaiting_validation,
        "created_at": session.created_at,
        "last_activity": session.last_activity,
    })))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct AuthenticateRequest {
    pub fir_number: String,
    pub auth_key: String,
}

#[utoipa::path(post, path = "/authenticate", responses((status = 200, description = "FIR finalized")))]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(request): Json<AuthenticateRequest>,
) -> Result<Json<serde_json::Value>, PipelineError> {
    crate::middleware::validation::validate_fir_number(&request.fir_number)?;
    let result = state.orchestrator.authenticate(&request.fir_number, &request.auth_key).await?;
    Ok(Json(result))
}
