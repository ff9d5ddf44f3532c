//! Workflow endpoints: definitions, submission, history, status, and the
//! live event stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{WorkflowState, WorkflowStatus};
use crate::providers::ProviderError;
use crate::state::ListFilter;
use crate::workflow::WorkflowDefinition;
use crate::AppState;

use super::ApiError;

/// Create the workflow router.
pub fn router() -> Router<AppState> {
    // The dynamic segment is a definition name on submit and a workflow id
    // on status/stream; the router requires one shared placeholder name.
    Router::new()
        .route("/workflow", get(list_workflows))
        .route("/workflow/history", get(workflow_history))
        .route("/workflow/{id}", post(submit_workflow))
        .route("/workflow/{id}/status", get(workflow_status))
        .route("/workflow/{id}/stream", get(stream_workflow))
}

/// Definition summary for the listing endpoint.
#[derive(Debug, Serialize)]
struct DefinitionSummary {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    steps: usize,
}

impl From<Arc<WorkflowDefinition>> for DefinitionSummary {
    fn from(def: Arc<WorkflowDefinition>) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            steps: def.steps.len(),
        }
    }
}

/// `GET /workflow` - definitions plus executor depths.
async fn list_workflows(State(state): State<AppState>) -> Json<serde_json::Value> {
    let workflows: Vec<DefinitionSummary> = state
        .workflows
        .list()
        .into_iter()
        .map(DefinitionSummary::from)
        .collect();
    Json(serde_json::json!({
        "workflows": workflows,
        "queue": state.executor.queue_len(),
        "running": state.executor.running_count(),
    }))
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    status: Option<String>,
    limit: Option<usize>,
}

/// `GET /workflow/history` - recorded statuses, newest first.
async fn workflow_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<WorkflowStatus>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<WorkflowState>)
        .transpose()
        .map_err(|e| ApiError::Provider(ProviderError::invalid_request("gateway", e)))?;

    let records = state
        .state
        .list(ListFilter {
            status,
            limit: query.limit,
        })
        .await?;
    Ok(Json(records))
}

/// Submission request body.
#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    input: serde_json::Value,
}

/// Submission response.
#[derive(Debug, Serialize)]
struct SubmitResponse {
    workflow_id: String,
    name: String,
    status: WorkflowState,
    status_url: String,
    stream_url: String,
}

/// `POST /workflow/{name}` - submit by definition name.
async fn submit_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(definition) = state.workflows.get(&name) else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Unknown workflow '{name}'") })),
        )
            .into_response());
    };

    let workflow_id = state.executor.submit(definition, body.input).await?;
    let status = state
        .state
        .get(&workflow_id)
        .await?
        .map_or(WorkflowState::Pending, |record| record.status);

    let response = SubmitResponse {
        status_url: format!("/workflow/{workflow_id}/status"),
        stream_url: format!("/workflow/{workflow_id}/stream"),
        workflow_id,
        name,
        status,
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// `GET /workflow/{id}/status` - full status record.
async fn workflow_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.state.get(&id).await? {
        Some(status) => Ok(Json(status).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Workflow '{id}' not found") })),
        )
            .into_response()),
    }
}

/// `GET /workflow/{id}/stream` - live server-sent events.
///
/// Protocol: `connected`, then the full current `status`; if the workflow
/// is already terminal the stream closes, otherwise every workflow event is
/// forwarded verbatim until a terminal one, followed by a brief grace and
/// close. Dropping the connection releases the subscription without
/// interrupting the driver.
async fn stream_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data(
            serde_json::json!({
                "workflow_id": id,
                "timestamp": chrono::Utc::now(),
            })
            .to_string(),
        ));

        // Subscribe before the status fetch so no event can fall between
        // the snapshot and the live stream.
        let mut rx = state.state.subscribe(&id);

        let status = match state.state.get(&id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                yield Ok(Event::default().event("error").data(
                    serde_json::json!({ "message": format!("Workflow '{id}' not found") })
                        .to_string(),
                ));
                return;
            }
            Err(e) => {
                yield Ok(Event::default().event("error").data(
                    serde_json::json!({ "message": e.to_string() }).to_string(),
                ));
                return;
            }
        };

        let already_terminal = status.status.is_terminal();
        yield Ok(Event::default()
            .event("status")
            .data(serde_json::to_string(&status).unwrap_or_default()));
        if already_terminal {
            return;
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let kind = event.kind;
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(kind.as_str()).data(payload));
                    if kind.is_terminal() {
                        // Brief grace so slow proxies flush the final frame.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(workflow_id = %id, skipped, "SSE subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
