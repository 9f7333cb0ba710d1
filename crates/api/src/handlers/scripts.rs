use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dsl::Diagnostic;
use engine::{Script, ScriptRun, Workflow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{context_from, ContextBody};
use crate::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateScriptDto {
    pub name: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Deserialize)]
pub struct UpdateCodeDto {
    pub code: String,
}

#[derive(Deserialize)]
pub struct UpdateScriptDto {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize)]
pub struct ValidateDto {
    pub code: String,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<Script>> {
    Json(state.engine.scripts().list().await)
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateScriptDto>,
) -> Result<(StatusCode, Json<Script>), ApiError> {
    let script = state.engine.scripts().create(payload.name, payload.code).await?;
    Ok((StatusCode::CREATED, Json(script)))
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Script>, ApiError> {
    Ok(Json(state.engine.scripts().get(id).await?))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateScriptDto>,
) -> Result<Json<Script>, ApiError> {
    let scripts = state.engine.scripts();
    let mut script = scripts.get(id).await?;
    if let Some(name) = payload.name {
        script = scripts.rename(id, name).await?;
    }
    if let Some(enabled) = payload.enabled {
        script = scripts.set_enabled(id, enabled).await?;
    }
    Ok(Json(script))
}

/// Saves the code even when it does not compile; the response carries the
/// fresh diagnostics.
pub async fn update_code(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateCodeDto>,
) -> Result<Json<Script>, ApiError> {
    Ok(Json(state.engine.scripts().update_code(id, payload.code).await?))
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.engine.scripts().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Option<Json<ContextBody>>,
) -> Result<Json<Vec<ScriptRun>>, ApiError> {
    let context = context_from(body);
    Ok(Json(state.engine.run_script(id, &context).await?))
}

pub async fn convert(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let workflow = state.engine.convert_script(id).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn validate(State(state): State<AppState>, Json(payload): Json<ValidateDto>) -> Json<ValidateResponse> {
    let diagnostics = state.engine.validate(&payload.code);
    Json(ValidateResponse {
        valid: !diagnostics.iter().any(Diagnostic::is_error),
        diagnostics,
    })
}
