//! The event and schedule boundary over HTTP, for external buses and timers.

use axum::{
    extract::{Path, State},
    Json,
};
use engine::{EventReport, ScheduleEntry};
use serde::Deserialize;
use tracing::info;

use super::{context_from, ContextBody};
use crate::AppState;

#[derive(Deserialize)]
pub struct FireScheduleDto {
    pub expr: String,
    #[serde(default)]
    pub context: ContextBody,
}

/// Waits for every run the event started.
pub async fn deliver(
    Path(name): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<ContextBody>>,
) -> Json<EventReport> {
    info!("event '{}' received", name);
    let context = context_from(body);
    Json(state.engine.handle_event(&name, context).await)
}

pub async fn schedules(State(state): State<AppState>) -> Json<Vec<ScheduleEntry>> {
    Json(state.engine.schedules().await)
}

pub async fn fire_schedule(State(state): State<AppState>, Json(payload): Json<FireScheduleDto>) -> Json<EventReport> {
    let context = context_from(Some(Json(payload.context)));
    Json(state.engine.fire_schedule(&payload.expr, context).await)
}
