//! Health and introspection endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::providers::RegistryStats;
use crate::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// Health response with registry and executor introspection.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    providers: RegistryStats,
    workflows: WorkflowStats,
}

#[derive(Debug, Serialize)]
struct WorkflowStats {
    definitions: usize,
    queue: usize,
    running: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        providers: state.registry.stats(),
        workflows: WorkflowStats {
            definitions: state.workflows.len(),
            queue: state.executor.queue_len(),
            running: state.executor.running_count(),
        },
    })
}
