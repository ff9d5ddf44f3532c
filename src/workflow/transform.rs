//! Transformers: pure functions mapping workflow input or prior step
//! results into the next step's typed input, plus the stream-drain helper
//! used to finalize text and vision steps.

use std::sync::Arc;

use futures::StreamExt;

use crate::domain::WorkflowError;
use crate::providers::{
    AudioInput, CategoryInput, ChatMessage, ChunkStream, EmbeddingInput, MediaInput,
};

use super::definition::StepInput;
use super::StepValue;

/// Drain a lazy chunk sequence into one concatenated string.
///
/// Used to finalize text/vision workflow steps; errors are surfaced raw for
/// classification by the caller.
pub async fn stream_to_string(mut stream: ChunkStream) -> anyhow::Result<String> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&chunk?);
    }
    Ok(out)
}

/// Convert a workflow input value into chat messages.
///
/// Accepts a plain string (wrapped as a single user message) or an object
/// carrying a `messages` array; anything else is rejected as an invalid
/// request.
pub fn chat_messages_from_value(value: &serde_json::Value) -> Result<Vec<ChatMessage>, WorkflowError> {
    match value {
        serde_json::Value::String(text) => Ok(vec![ChatMessage::user(text.clone())]),
        serde_json::Value::Object(map) => {
            let messages = map.get("messages").ok_or_else(|| {
                WorkflowError::invalid_input("input object must carry a 'messages' array")
            })?;
            serde_json::from_value(messages.clone()).map_err(|e| {
                WorkflowError::invalid_input(format!("invalid 'messages' array: {e}"))
            })
        }
        _ => Err(WorkflowError::invalid_input(
            "input must be a string or an object with a 'messages' array",
        )),
    }
}

/// Convert a workflow input value into an image/video generation input.
///
/// Accepts a plain string (used as the prompt) or an object with a
/// `prompt`; anything else is rejected as an invalid request.
pub fn media_input_from_value(value: &serde_json::Value) -> Result<MediaInput, WorkflowError> {
    match value {
        serde_json::Value::String(prompt) => Ok(MediaInput::from_prompt(prompt.clone())),
        serde_json::Value::Object(map) if map.contains_key("prompt") => {
            serde_json::from_value(value.clone())
                .map_err(|e| WorkflowError::invalid_input(format!("invalid media input: {e}")))
        }
        _ => Err(WorkflowError::invalid_input(
            "input must be a string or an object with a 'prompt'",
        )),
    }
}

/// Convert a workflow input value into a speech synthesis input.
///
/// Accepts a plain string (used as the input text) or an object with an
/// `input`; anything else is rejected as an invalid request.
pub fn audio_input_from_value(value: &serde_json::Value) -> Result<AudioInput, WorkflowError> {
    match value {
        serde_json::Value::String(text) => Ok(AudioInput::from_text(text.clone())),
        serde_json::Value::Object(map) if map.contains_key("input") => {
            serde_json::from_value(value.clone())
                .map_err(|e| WorkflowError::invalid_input(format!("invalid audio input: {e}")))
        }
        _ => Err(WorkflowError::invalid_input(
            "input must be a string or an object with an 'input'",
        )),
    }
}

/// Workflow input → chat messages, for a text or vision step.
#[must_use]
pub fn input_to_chat_messages() -> StepInput {
    StepInput::Transform(Arc::new(|input, _ctx| {
        Ok(CategoryInput::Chat(chat_messages_from_value(input)?))
    }))
}

/// Workflow input → image generation input.
#[must_use]
pub fn input_to_image_input() -> StepInput {
    StepInput::Transform(Arc::new(|input, _ctx| {
        Ok(CategoryInput::Image(media_input_from_value(input)?))
    }))
}

/// Previous step's text → image generation prompt.
///
/// Fails loudly when the previous step produced no text.
#[must_use]
pub fn previous_text_to_image_input() -> StepInput {
    StepInput::Transform(Arc::new(|_input, ctx| {
        let text = previous_text(ctx)?;
        Ok(CategoryInput::Image(MediaInput::from_prompt(text)))
    }))
}

/// Previous step's text → speech synthesis input.
///
/// Fails loudly when the previous step produced no text.
#[must_use]
pub fn previous_text_to_audio_input() -> StepInput {
    StepInput::Transform(Arc::new(|_input, ctx| {
        let text = previous_text(ctx)?;
        Ok(CategoryInput::Audio(AudioInput::from_text(text)))
    }))
}

/// Previous step's image → a vision message pairing the first image URL
/// with the supplied prompt.
///
/// Fails loudly when the previous step produced no image.
#[must_use]
pub fn previous_image_to_vision_input(prompt: impl Into<String>) -> StepInput {
    let prompt = prompt.into();
    StepInput::Transform(Arc::new(move |_input, ctx| {
        let image = ctx
            .previous_result()
            .and_then(StepValue::as_image)
            .ok_or_else(|| {
                WorkflowError::invalid_input(format!(
                    "step {} requires an image result from the previous step",
                    ctx.current_step
                ))
            })?;
        let url = image.urls.first().ok_or_else(|| {
            WorkflowError::invalid_input("previous image result carries no URLs")
        })?;
        Ok(CategoryInput::Chat(vec![ChatMessage::user_with_image(
            prompt.clone(),
            url.clone(),
        )]))
    }))
}

/// Workflow input → embedding input.
///
/// Accepts a plain string or an array of strings.
#[must_use]
pub fn input_to_embedding_input() -> StepInput {
    StepInput::Transform(Arc::new(|input, _ctx| {
        let texts = match input {
            serde_json::Value::String(s) => vec![s.clone()],
            serde_json::Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        WorkflowError::invalid_input("embedding input array must contain strings")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(WorkflowError::invalid_input(
                    "input must be a string or an array of strings",
                ))
            }
        };
        Ok(CategoryInput::Embedding(EmbeddingInput { texts }))
    }))
}

fn previous_text(ctx: &crate::workflow::WorkflowContext) -> Result<String, WorkflowError> {
    ctx.previous_result()
        .and_then(StepValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| {
            WorkflowError::invalid_input(format!(
                "step {} requires a text result from the previous step",
                ctx.current_step
            ))
        })
}
