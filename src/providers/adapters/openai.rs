//! OpenAI and OpenAI-compatible adapters.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use crate::providers::{
    AudioInput, AudioProvider, AudioResult, ChatMessage, ChatProvider, ChunkStream,
    EmbeddingInput, EmbeddingProvider, EmbeddingResult, ImageProvider, ImageResult, MediaInput,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

fn http_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .expect("Failed to create HTTP client")
}

/// Streaming chat completions against `/v1/chat/completions`.
///
/// Also serves the vision category: messages may carry image-URL parts.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    /// Create an adapter with the default model.
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: "gpt-4o".to_string(),
        }
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn api_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(&self, messages: Vec<ChatMessage>) -> anyhow::Result<ChunkStream> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .client
            .post(self.api_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, text);
        }

        let stream = response.bytes_stream();

        let chunk_stream = async_stream::stream! {
            let mut buffer = String::new();

            futures::pin_mut!(stream);

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(anyhow::anyhow!("Stream error: {}", e));
                        continue;
                    }
                };

                let chunk_str = match std::str::from_utf8(&chunk) {
                    Ok(s) => s,
                    Err(e) => {
                        yield Err(anyhow::anyhow!("UTF-8 error: {}", e));
                        continue;
                    }
                };

                buffer.push_str(chunk_str);

                // Process complete SSE frames
                while let Some(pos) = buffer.find("\n\n") {
                    let frame = buffer[..pos].to_string();
                    buffer = buffer[pos + 2..].to_string();

                    for data_line in frame.lines() {
                        if let Some(data) = data_line.strip_prefix("data: ") {
                            if data.trim() == "[DONE]" {
                                continue;
                            }
                            match serde_json::from_str::<StreamChunk>(data) {
                                Ok(parsed) => {
                                    if let Some(content) = parsed.content() {
                                        yield Ok(content);
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to parse chunk: {} - {}", e, data);
                                }
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(chunk_stream))
    }
}

/// Streaming response chunk.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl StreamChunk {
    fn content(self) -> Option<String> {
        self.choices?
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|c| !c.is_empty())
    }
}

/// Image generation against `/v1/images/generations`.
#[derive(Debug, Clone)]
pub struct OpenAiImages {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiImages {
    /// Create an adapter with the default model.
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: "dall-e-3".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    async fn generate(&self, input: MediaInput) -> anyhow::Result<ImageResult> {
        let body = serde_json::json!({
            "model": input.options.model.as_deref().unwrap_or(&self.model),
            "prompt": input.prompt,
            "n": input.options.count.unwrap_or(1),
            "size": input.options.size.as_deref().unwrap_or("1024x1024"),
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/images/generations",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, text);
        }

        let parsed: ImagesResponse = response.json().await?;
        let revised_prompt = parsed.data.iter().find_map(|d| d.revised_prompt.clone());
        let urls: Vec<String> = parsed.data.into_iter().filter_map(|d| d.url).collect();

        if urls.is_empty() {
            anyhow::bail!("OpenAI returned no image URLs");
        }

        Ok(ImageResult {
            urls,
            revised_prompt,
            metadata: None,
        })
    }
}

/// Speech synthesis against `/v1/audio/speech`.
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiSpeech {
    /// Create an adapter with the default model.
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: "tts-1".to_string(),
        }
    }
}

#[async_trait]
impl AudioProvider for OpenAiSpeech {
    async fn synthesize(&self, input: AudioInput) -> anyhow::Result<AudioResult> {
        let format = input.options.format.as_deref().unwrap_or("mp3");
        let body = serde_json::json!({
            "model": input.options.model.as_deref().unwrap_or(&self.model),
            "voice": input.options.voice.as_deref().unwrap_or("alloy"),
            "input": input.input,
            "response_format": format,
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/audio/speech",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, text);
        }

        // The speech endpoint returns raw audio bytes; expose them as a data
        // URL. Duration is estimated from the input length (the endpoint does
        // not report it).
        let word_count = input.input.split_whitespace().count();
        let duration_secs = (word_count as f64 / 2.5).max(0.1);

        let bytes = response.bytes().await?;
        let encoded = general_purpose::STANDARD.encode(&bytes);

        Ok(AudioResult {
            url: format!("data:audio/{format};base64,{encoded}"),
            duration_secs,
        })
    }
}

/// Embeddings against `/v1/embeddings`.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddings {
    /// Create an adapter with the default model.
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, input: EmbeddingInput) -> anyhow::Result<EmbeddingResult> {
        let body = serde_json::json!({
            "model": self.model,
            "input": input.texts,
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/embeddings",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, text);
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        Ok(EmbeddingResult {
            vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_chunk_content() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(chunk.content().as_deref(), Some("hi"));

        let empty: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert!(empty.content().is_none());
    }
}
