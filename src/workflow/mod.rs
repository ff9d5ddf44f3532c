//! Workflow definitions, transformers, and the bounded-concurrency
//! executor.

pub mod context;
pub mod definition;
pub mod executor;
pub mod library;
pub mod transform;

pub use context::WorkflowContext;
pub use definition::{StepDefinition, StepInput, WorkflowBuilder, WorkflowDefinition};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use library::WorkflowLibrary;

use crate::providers::{AudioResult, EmbeddingResult, ImageResult, VideoResult};

/// Typed value produced by a completed step, threaded to later steps
/// through the workflow context.
///
/// Text and vision steps store the fully concatenated stream; the other
/// categories store their structured results.
#[derive(Debug, Clone)]
pub enum StepValue {
    /// Drained text/vision output.
    Text(String),
    /// Image generation output.
    Image(ImageResult),
    /// Video generation output.
    Video(VideoResult),
    /// Speech synthesis output.
    Audio(AudioResult),
    /// Embedding output.
    Embedding(EmbeddingResult),
}

impl StepValue {
    /// The text payload, when this is a text/vision result.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The image payload, when this is an image result.
    #[must_use]
    pub fn as_image(&self) -> Option<&ImageResult> {
        match self {
            Self::Image(r) => Some(r),
            _ => None,
        }
    }

    /// JSON rendering for persistence: text as a plain string, structured
    /// results as plain objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Image(r) => serde_json::to_value(r).unwrap_or_default(),
            Self::Video(r) => serde_json::to_value(r).unwrap_or_default(),
            Self::Audio(r) => serde_json::to_value(r).unwrap_or_default(),
            Self::Embedding(r) => serde_json::to_value(r).unwrap_or_default(),
        }
    }
}
