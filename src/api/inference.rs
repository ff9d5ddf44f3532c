//! Single-call inference endpoints: thin wrappers over the per-category
//! failover executor.
//!
//! Text, chat, and vision stream raw chunks as server-sent events with an
//! `X-AI-Service` header naming the provider that won; the other categories
//! respond with the structured result plus `service`.

use std::convert::Infallible;

use axum::{
    extract::State,
    http::HeaderValue,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures::StreamExt;

use crate::domain::WorkflowError;
use crate::providers::{
    Category, CategoryInput, CategoryOutput, Execution, FailoverExecutor, ProviderError,
};
use crate::workflow::transform;
use crate::AppState;

use super::ApiError;

/// Create the inference router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/text", post(text_completion))
        .route("/chat", post(text_completion))
        .route("/vision", post(vision_completion))
        .route("/image", post(generate_image))
        .route("/video", post(generate_video))
        .route("/audio", post(synthesize_audio))
}

/// An input-shape rejection, rendered through the provider error envelope.
fn invalid(err: WorkflowError) -> ApiError {
    ApiError::Provider(ProviderError::invalid_request("gateway", err.message))
}

/// Run one operation against a category with the shared retry config.
async fn execute(
    state: &AppState,
    category: Category,
    input: CategoryInput,
) -> Result<Execution, ApiError> {
    let executor =
        FailoverExecutor::from_registry(&state.registry, category, state.config.retry.clone());
    Ok(executor.execute(&input).await?)
}

async fn text_completion(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    stream_chat(state, Category::Text, body).await
}

async fn vision_completion(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    stream_chat(state, Category::Vision, body).await
}

/// Stream a chat completion as raw SSE chunks.
async fn stream_chat(
    state: AppState,
    category: Category,
    body: serde_json::Value,
) -> Result<Response, ApiError> {
    let messages = transform::chat_messages_from_value(&body).map_err(invalid)?;
    let execution = execute(&state, category, CategoryInput::Chat(messages)).await?;

    let CategoryOutput::Stream(stream) = execution.output else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "chat execution returned a non-stream output"
        )));
    };

    let service = execution.service;
    let events = stream.map(|chunk| {
        Ok::<_, Infallible>(match chunk {
            Ok(text) => Event::default().data(text),
            // Mid-stream failures become error frames; the status line is
            // already committed.
            Err(e) => Event::default().event("error").data(e.to_string()),
        })
    });

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&service) {
        response.headers_mut().insert("x-ai-service", value);
    }
    Ok(response)
}

async fn generate_image(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let input = transform::media_input_from_value(&body).map_err(invalid)?;
    let execution = execute(&state, Category::Image, CategoryInput::Image(input)).await?;

    let CategoryOutput::Image(result) = execution.output else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "image execution returned an unexpected output shape"
        )));
    };
    Ok(Json(with_service(
        serde_json::to_value(result).map_err(anyhow::Error::from)?,
        &execution.service,
    )))
}

async fn generate_video(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let input = transform::media_input_from_value(&body).map_err(invalid)?;
    let execution = execute(&state, Category::Video, CategoryInput::Video(input)).await?;

    let CategoryOutput::Video(result) = execution.output else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "video execution returned an unexpected output shape"
        )));
    };
    Ok(Json(with_service(
        serde_json::to_value(result).map_err(anyhow::Error::from)?,
        &execution.service,
    )))
}

async fn synthesize_audio(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let input = transform::audio_input_from_value(&body).map_err(invalid)?;
    let execution = execute(&state, Category::Audio, CategoryInput::Audio(input)).await?;

    let CategoryOutput::Audio(result) = execution.output else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "audio execution returned an unexpected output shape"
        )));
    };
    Ok(Json(with_service(
        serde_json::to_value(result).map_err(anyhow::Error::from)?,
        &execution.service,
    )))
}

/// Attach the winning provider name to a structured result.
fn with_service(mut value: serde_json::Value, service: &str) -> serde_json::Value {
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "service".to_string(),
            serde_json::Value::String(service.to_string()),
        );
    }
    value
}
