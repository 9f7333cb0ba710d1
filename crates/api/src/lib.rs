//! `api` crate — HTTP REST API over the automation engine.
//!
//! Exposes:
//!   GET/POST      /api/v1/scripts
//!   GET/PATCH/DEL /api/v1/scripts/:id
//!   PUT           /api/v1/scripts/:id/code
//!   POST          /api/v1/scripts/:id/run
//!   POST          /api/v1/scripts/:id/convert
//!   POST          /api/v1/validate
//!   GET/POST      /api/v1/workflows
//!   POST          /api/v1/workflows/import
//!   GET/PATCH/DEL /api/v1/workflows/:id
//!   POST          /api/v1/workflows/:id/duplicate
//!   POST          /api/v1/workflows/:id/execute
//!   GET           /api/v1/workflows/:id/export
//!   POST          /api/v1/workflows/:id/nodes
//!   PATCH/DEL     /api/v1/workflows/:id/nodes/:node_id
//!   POST          /api/v1/workflows/:id/connections
//!   DEL           /api/v1/workflows/:id/connections/:connection_id
//!   PUT           /api/v1/workflows/:id/variables/:name
//!   GET           /api/v1/templates
//!   GET           /api/v1/executions?workflowId=&status=
//!   POST          /api/v1/events/:name
//!   GET           /api/v1/schedules
//!   POST          /api/v1/schedules/fire

pub mod error;
pub mod handlers;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use engine::AutomationEngine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
use handlers::{events, executions, scripts, workflows};

#[derive(Clone)]
pub struct AppState {
    pub engine: AutomationEngine,
}

pub fn router(engine: AutomationEngine) -> Router {
    Router::new()
        .route("/api/v1/scripts", get(scripts::list).post(scripts::create))
        .route(
            "/api/v1/scripts/:id",
            get(scripts::get).patch(scripts::update).delete(scripts::delete),
        )
        .route("/api/v1/scripts/:id/code", put(scripts::update_code))
        .route("/api/v1/scripts/:id/run", post(scripts::run))
        .route("/api/v1/scripts/:id/convert", post(scripts::convert))
        .route("/api/v1/validate", post(scripts::validate))
        .route("/api/v1/workflows", get(workflows::list).post(workflows::create))
        .route("/api/v1/workflows/import", post(workflows::import))
        .route(
            "/api/v1/workflows/:id",
            get(workflows::get).patch(workflows::update).delete(workflows::delete),
        )
        .route("/api/v1/workflows/:id/duplicate", post(workflows::duplicate))
        .route("/api/v1/workflows/:id/execute", post(workflows::execute))
        .route("/api/v1/workflows/:id/export", get(workflows::export))
        .route("/api/v1/workflows/:id/nodes", post(workflows::add_node))
        .route(
            "/api/v1/workflows/:id/nodes/:node_id",
            patch(workflows::update_node).delete(workflows::remove_node),
        )
        .route("/api/v1/workflows/:id/connections", post(workflows::connect))
        .route(
            "/api/v1/workflows/:id/connections/:connection_id",
            delete(workflows::disconnect),
        )
        .route("/api/v1/workflows/:id/variables/:name", put(workflows::set_variable))
        .route("/api/v1/templates", get(workflows::templates))
        .route("/api/v1/executions", get(executions::list))
        .route("/api/v1/events/:name", post(events::deliver))
        .route("/api/v1/schedules", get(events::schedules))
        .route("/api/v1/schedules/fire", post(events::fire_schedule))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

/// Serve the API on `bind` until Ctrl-C.
pub async fn serve(bind: &str, engine: AutomationEngine) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
