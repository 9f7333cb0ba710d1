use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use dsl::Trigger;
use engine::{Connection, Execution, NodePatch, NodeTemplate, Position, Workflow, WorkflowNode, WorkflowPatch};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{context_from, ContextBody};
use crate::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "manual")]
    pub trigger: Trigger,
}

fn manual() -> Trigger {
    Trigger::Manual
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeDto {
    pub template_id: String,
    #[serde(default)]
    pub position: Position,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectDto {
    pub source_node_id: String,
    pub target_node_id: String,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<Workflow>> {
    Json(state.engine.workflows().list().await)
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.engine.workflows().get(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let workflow = state
        .engine
        .workflows()
        .create(payload.name, payload.description, payload.trigger)
        .await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(patch): Json<WorkflowPatch>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.engine.workflows().update(id, patch).await?))
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.engine.workflows().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn duplicate(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let copy = state.engine.workflows().duplicate(id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// An unknown template adds nothing and answers `null`.
pub async fn add_node(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<AddNodeDto>,
) -> Result<Json<Option<WorkflowNode>>, ApiError> {
    let node = state
        .engine
        .workflows()
        .add_node(id, &payload.template_id, payload.position)
        .await?;
    Ok(Json(node))
}

pub async fn update_node(
    Path((id, node_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    Json(patch): Json<NodePatch>,
) -> Result<Json<WorkflowNode>, ApiError> {
    Ok(Json(state.engine.workflows().update_node(id, &node_id, patch).await?))
}

pub async fn remove_node(
    Path((id, node_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.engine.workflows().remove_node(id, &node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn connect(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ConnectDto>,
) -> Result<(StatusCode, Json<Connection>), ApiError> {
    let connection = state
        .engine
        .workflows()
        .connect(
            id,
            &payload.source_node_id,
            &payload.target_node_id,
            payload.source_handle,
            payload.target_handle,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

pub async fn disconnect(
    Path((id, connection_id)): Path<(Uuid, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.engine.workflows().disconnect(id, &connection_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("connection '{connection_id}' not found")))
    }
}

pub async fn set_variable(
    Path((id, name)): Path<(Uuid, String)>,
    State(state): State<AppState>,
    Json(value): Json<Value>,
) -> Result<StatusCode, ApiError> {
    state.engine.workflows().set_variable(id, name, value).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Runs to completion; node failures come back as a `failed` execution.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Option<Json<ContextBody>>,
) -> Result<Json<Execution>, ApiError> {
    let context = context_from(body);
    Ok(Json(state.engine.execute_workflow(id, &context).await?))
}

pub async fn export(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let json = state.engine.export_workflow(id).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json))
}

/// Takes the exported JSON as the raw body.
pub async fn import(State(state): State<AppState>, body: String) -> impl IntoResponse {
    match state.engine.import_workflow(&body).await {
        Some(workflow) => (StatusCode::CREATED, Json(json!(workflow))),
        None => (StatusCode::BAD_REQUEST, Json(json!({ "imported": false }))),
    }
}

pub async fn templates(State(state): State<AppState>) -> Json<Vec<NodeTemplate>> {
    Json(state.engine.catalog().list().into_iter().cloned().collect())
}
