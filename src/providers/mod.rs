//! Provider abstractions: categories, typed inputs/outputs, traits, the
//! registry, and the failover executor.
//!
//! Each provider is a stateless adapter for exactly one [`Category`]. The
//! per-category operation shapes are explicit struct types; dispatch across
//! categories happens over the [`ProviderService`] tagged variant.

pub mod adapters;
pub mod error;
pub mod failover;
pub mod registry;

pub use error::{classify, classify_message, ErrorCode, ProviderError, ProviderResult};
pub use failover::{Execution, FailoverExecutor, RetryConfig};
pub use registry::{ProviderRegistry, RegistryStats};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Coarse kind of AI operation, determining input and output shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Chat/text completion; returns a lazy chunk stream.
    Text,
    /// Image understanding over chat messages; returns a lazy chunk stream.
    Vision,
    /// Image generation; returns URLs plus metadata.
    Image,
    /// Video generation; returns URLs plus metadata.
    Video,
    /// Speech synthesis; returns a URL plus duration.
    Audio,
    /// Text embedding; returns one vector per input text.
    Embedding,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 6] = [
        Category::Text,
        Category::Vision,
        Category::Image,
        Category::Video,
        Category::Audio,
        Category::Embedding,
    ];

    /// Wire representation of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author.
    pub role: ChatRole,
    /// Content of the message.
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message pairing an image URL with a text prompt.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                        detail: None,
                    },
                },
            ]),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Message content - either simple text or multimodal parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Multimodal content with text and image parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Get the first text content, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Parts(parts) => parts.iter().find_map(|p| {
                if let ContentPart::Text { text } = p {
                    Some(text.as_str())
                } else {
                    None
                }
            }),
        }
    }
}

/// A content part for multimodal messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content (URL or base64 data URL).
    ImageUrl {
        /// Image URL configuration.
        image_url: ImageUrl,
    },
}

/// Image URL configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Image URL (HTTP URL or base64 data URL).
    pub url: String,
    /// Detail level hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Input to an image or video generation step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInput {
    /// Generation prompt.
    pub prompt: String,
    /// Generation options.
    #[serde(default)]
    pub options: MediaOptions,
}

impl MediaInput {
    /// Build a media input from a bare prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: MediaOptions::default(),
        }
    }
}

/// Options for image/video generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaOptions {
    /// Model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Output dimensions, e.g. "1024x1024".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Number of outputs requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Input to a speech synthesis step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioInput {
    /// Text to synthesize.
    pub input: String,
    /// Synthesis options.
    #[serde(default)]
    pub options: AudioOptions,
}

impl AudioInput {
    /// Build an audio input from bare text.
    pub fn from_text(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            options: AudioOptions::default(),
        }
    }
}

/// Options for speech synthesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioOptions {
    /// Model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Voice preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Output format, e.g. "mp3".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Input to an embedding step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingInput {
    /// Texts to embed, one vector returned per entry.
    pub texts: Vec<String>,
}

/// Typed input for one category operation.
#[derive(Debug, Clone)]
pub enum CategoryInput {
    /// Message list for text and vision.
    Chat(Vec<ChatMessage>),
    /// Prompt plus options for image generation.
    Image(MediaInput),
    /// Prompt plus options for video generation.
    Video(MediaInput),
    /// Text plus options for speech synthesis.
    Audio(AudioInput),
    /// Texts for embedding.
    Embedding(EmbeddingInput),
}

/// Result of an image generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// One or more output URLs.
    pub urls: Vec<String>,
    /// Provider-revised prompt, when the upstream rewrites it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    /// Provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Result of a video generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    /// One or more output URLs.
    pub urls: Vec<String>,
    /// Clip duration in seconds, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Result of a speech synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResult {
    /// Output URL (possibly a data URL).
    pub url: String,
    /// Duration in seconds.
    pub duration_secs: f64,
}

/// Result of an embedding call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    /// One vector per input text.
    pub vectors: Vec<Vec<f32>>,
}

/// A lazy, finite sequence of response text chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Typed output of one category operation.
///
/// Text and vision yield the provider's lazy chunk stream so the single-call
/// endpoints can forward it raw; workflow steps drain it to a string before
/// the step completes.
pub enum CategoryOutput {
    /// Lazy chunk stream (text, vision).
    Stream(ChunkStream),
    /// Image generation result.
    Image(ImageResult),
    /// Video generation result.
    Video(VideoResult),
    /// Speech synthesis result.
    Audio(AudioResult),
    /// Embedding result.
    Embedding(EmbeddingResult),
}

impl std::fmt::Debug for CategoryOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Image(v) => f.debug_tuple("Image").field(v).finish(),
            Self::Video(v) => f.debug_tuple("Video").field(v).finish(),
            Self::Audio(v) => f.debug_tuple("Audio").field(v).finish(),
            Self::Embedding(v) => f.debug_tuple("Embedding").field(v).finish(),
        }
    }
}

/// Provider operation for the text and vision categories.
///
/// Errors are surfaced raw; classification happens once, at the failover
/// executor boundary.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stream a completion for the given messages.
    async fn complete(&self, messages: Vec<ChatMessage>) -> anyhow::Result<ChunkStream>;
}

/// Provider operation for the image category.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one or more images.
    async fn generate(&self, input: MediaInput) -> anyhow::Result<ImageResult>;
}

/// Provider operation for the video category.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Generate a video clip.
    async fn generate(&self, input: MediaInput) -> anyhow::Result<VideoResult>;
}

/// Provider operation for the audio category.
#[async_trait]
pub trait AudioProvider: Send + Sync {
    /// Synthesize speech for the given input.
    async fn synthesize(&self, input: AudioInput) -> anyhow::Result<AudioResult>;
}

/// Provider operation for the embedding category.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed the given texts.
    async fn embed(&self, input: EmbeddingInput) -> anyhow::Result<EmbeddingResult>;
}

/// Tagged variant over category operations.
#[derive(Clone)]
pub enum ProviderService {
    /// Text completion.
    Text(Arc<dyn ChatProvider>),
    /// Vision analysis (same operation shape as text).
    Vision(Arc<dyn ChatProvider>),
    /// Image generation.
    Image(Arc<dyn ImageProvider>),
    /// Video generation.
    Video(Arc<dyn VideoProvider>),
    /// Speech synthesis.
    Audio(Arc<dyn AudioProvider>),
    /// Text embedding.
    Embedding(Arc<dyn EmbeddingProvider>),
}

impl ProviderService {
    /// Category this service handles.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Text(_) => Category::Text,
            Self::Vision(_) => Category::Vision,
            Self::Image(_) => Category::Image,
            Self::Video(_) => Category::Video,
            Self::Audio(_) => Category::Audio,
            Self::Embedding(_) => Category::Embedding,
        }
    }
}

impl std::fmt::Debug for ProviderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProviderService")
            .field(&self.category())
            .finish()
    }
}

/// A named, registered provider.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name, unique within its category.
    pub name: String,
    /// The category operation.
    pub service: ProviderService,
}

impl Provider {
    /// Create a provider from a name and service.
    pub fn new(name: impl Into<String>, service: ProviderService) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }

    /// Category this provider serves.
    #[must_use]
    pub fn category(&self) -> Category {
        self.service.category()
    }
}
