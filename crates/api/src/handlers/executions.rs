use axum::{
    extract::{Query, State},
    Json,
};
use engine::{Execution, ExecutionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionsQuery {
    pub workflow_id: Option<Uuid>,
    /// `running`, `completed`, `failed` or `cancelled`.
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ExecutionsResponse {
    pub active: Vec<Execution>,
    pub history: Vec<Execution>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ExecutionsQuery>,
) -> Result<Json<ExecutionsResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExecutionStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let keep = |e: &Execution| {
        query.workflow_id.map_or(true, |id| e.workflow_id == id) && status.map_or(true, |s| e.status == s)
    };

    let mut active = state.engine.active_executions();
    active.retain(|e| keep(e));
    let mut history = state.engine.execution_history(query.workflow_id);
    history.retain(|e| keep(e));

    Ok(Json(ExecutionsResponse { active, history }))
}
