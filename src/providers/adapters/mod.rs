//! Thin upstream provider adapters.
//!
//! Each adapter is a single `reqwest` call (or SSE-line parse loop for chat
//! streaming) that surfaces raw error text; classification happens at the
//! failover executor boundary, never here.

mod anthropic;
mod openai;

pub use anthropic::AnthropicChat;
pub use openai::{OpenAiChat, OpenAiEmbeddings, OpenAiImages, OpenAiSpeech};

use std::sync::Arc;

use crate::config::AppConfig;
use crate::providers::{Provider, ProviderRegistry, ProviderService};

/// Register the adapters enabled by the configuration's provider credentials.
///
/// Registration order decides failover ranking within a category, so the
/// OpenAI family registers first when both upstreams are configured.
pub fn register_from_config(registry: &ProviderRegistry, config: &AppConfig) -> usize {
    let mut registered = 0;

    if let Some(key) = &config.providers.openai.api_key {
        let base_url = config.providers.openai.base_url.clone();

        let chat = Arc::new(OpenAiChat::new(key.clone(), base_url.clone()));
        registry.register(Provider::new(
            "openai",
            ProviderService::Text(chat.clone()),
        ));
        registry.register(Provider::new("openai", ProviderService::Vision(chat)));
        registry.register(Provider::new(
            "openai",
            ProviderService::Image(Arc::new(OpenAiImages::new(key.clone(), base_url.clone()))),
        ));
        registry.register(Provider::new(
            "openai",
            ProviderService::Audio(Arc::new(OpenAiSpeech::new(key.clone(), base_url.clone()))),
        ));
        registry.register(Provider::new(
            "openai",
            ProviderService::Embedding(Arc::new(OpenAiEmbeddings::new(key.clone(), base_url))),
        ));
        registered += 5;
    }

    if let Some(key) = &config.providers.anthropic.api_key {
        let chat = Arc::new(AnthropicChat::new(
            key.clone(),
            config.providers.anthropic.base_url.clone(),
        ));
        registry.register(Provider::new(
            "anthropic",
            ProviderService::Text(chat.clone()),
        ));
        registry.register(Provider::new("anthropic", ProviderService::Vision(chat)));
        registered += 2;
    }

    registered
}
