//! Anthropic Claude chat adapter.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use crate::providers::{
    ChatMessage, ChatProvider, ChatRole, ChunkStream, ContentPart, MessageContent,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Streaming chat completions against `/v1/messages`.
///
/// Also serves the vision category: image-URL parts are converted to
/// Anthropic image content blocks.
#[derive(Debug, Clone)]
pub struct AnthropicChat {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicChat {
    /// Create an adapter with the default model.
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()
                .expect("Failed to create HTTP client"),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
        }
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn api_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    /// Convert messages to Anthropic format, splitting off the system prompt.
    fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<serde_json::Value>) {
        let mut system_prompt = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                ChatRole::System => {
                    if let Some(text) = msg.content.as_text() {
                        system_prompt = Some(text.to_string());
                    }
                }
                ChatRole::User | ChatRole::Assistant => {
                    let role = if msg.role == ChatRole::User {
                        "user"
                    } else {
                        "assistant"
                    };
                    let content = match &msg.content {
                        MessageContent::Text(text) => serde_json::Value::String(text.clone()),
                        MessageContent::Parts(parts) => serde_json::Value::Array(
                            parts.iter().map(Self::convert_part).collect(),
                        ),
                    };
                    converted.push(serde_json::json!({
                        "role": role,
                        "content": content,
                    }));
                }
            }
        }

        (system_prompt, converted)
    }

    fn convert_part(part: &ContentPart) -> serde_json::Value {
        match part {
            ContentPart::Text { text } => serde_json::json!({
                "type": "text",
                "text": text,
            }),
            ContentPart::ImageUrl { image_url } => serde_json::json!({
                "type": "image",
                "source": {
                    "type": "url",
                    "url": image_url.url,
                },
            }),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicChat {
    async fn complete(&self, messages: Vec<ChatMessage>) -> anyhow::Result<ChunkStream> {
        let (system_prompt, converted) = Self::convert_messages(&messages);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": converted,
            "max_tokens": self.max_tokens,
            "stream": true,
        });
        if let Some(system) = system_prompt {
            body["system"] = serde_json::Value::String(system);
        }

        let response = self
            .client
            .post(self.api_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({}): {}", status, text);
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

                while let Some(pos) = buffer.find("\n\n") {
                    let frame = buffer[..pos].to_string();
                    buffer = buffer[pos + 2..].to_string();

                    for data_line in frame.lines() {
                        if let Some(data) = data_line.strip_prefix("data: ") {
                            match serde_json::from_str::<StreamEvent>(data) {
                                Ok(event) => {
                                    if let Some(text) = event.text_delta() {
                                        yield Ok(text);
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to parse event: {} - {}", e, data);
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

/// Anthropic streaming event (only the text-delta shape is interesting).
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    text: Option<String>,
}

impl StreamEvent {
    fn text_delta(self) -> Option<String> {
        if self.event_type != "content_block_delta" {
            return None;
        }
        self.delta?.text.filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatMessage;

    #[test]
    fn test_system_prompt_split_off() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
        ];
        let (system, converted) = AnthropicChat::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["role"], "user");
    }

    #[test]
    fn test_image_part_becomes_image_block() {
        let messages = vec![ChatMessage::user_with_image("describe", "https://x/y.png")];
        let (_, converted) = AnthropicChat::convert_messages(&messages);
        let content = converted[0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["url"], "https://x/y.png");
    }

    #[test]
    fn test_text_delta_extraction() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(event.text_delta().as_deref(), Some("hi"));

        let other: StreamEvent =
            serde_json::from_str(r#"{"type":"message_start"}"#).unwrap();
        assert!(other.text_delta().is_none());
    }
}
