//! Configuration management for the Prism gateway.
//!
//! Configuration is loaded from defaults, an optional config file, and
//! environment variables, in that order. A handful of well-known variables
//! (`PORT`, `API_KEY`, `WORKFLOW_*`, `REDIS_URL`, provider keys) are applied
//! as explicit overrides on top so the gateway can be configured without a
//! prefix convention.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::RetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Gateway configuration (bearer auth).
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Workflow executor configuration.
    #[serde(default)]
    pub workflow: WorkflowSettings,
    /// Failover retry configuration, shared by every category.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Redis configuration. When a URL is present the Redis state backend
    /// is selected instead of the in-memory one.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Upstream provider credentials.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl AppConfig {
    /// Load configuration from environment and config files.
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .add_source(config::File::with_name("config/prism").required(false))
            .add_source(
                config::Environment::with_prefix("PRISM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize().unwrap_or_default();

        // Explicit overrides for the well-known variables.
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                app_config.server.port = port;
            }
        }
        if let Ok(key) = std::env::var("API_KEY") {
            app_config.gateway.api_key = Some(key);
        }
        if let Ok(v) = std::env::var("WORKFLOW_MAX_CONCURRENT") {
            if let Ok(v) = v.parse() {
                app_config.workflow.max_concurrent = v;
            }
        }
        if let Ok(v) = std::env::var("WORKFLOW_STEP_TIMEOUT_MS") {
            if let Ok(v) = v.parse() {
                app_config.workflow.step_timeout_ms = v;
            }
        }
        if let Ok(v) = std::env::var("WORKFLOW_TOTAL_TIMEOUT_MS") {
            if let Ok(v) = v.parse() {
                app_config.workflow.total_timeout_ms = v;
            }
        }
        if let Ok(v) = std::env::var("WORKFLOW_RESULT_TTL_SECONDS") {
            if let Ok(v) = v.parse() {
                app_config.workflow.result_ttl_seconds = v;
            }
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            app_config.redis.url = Some(url);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            app_config.providers.openai.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            app_config.providers.anthropic.api_key = Some(key);
        }

        Ok(app_config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Static bearer key. When unset, authentication is disabled.
    pub api_key: Option<String>,
}

/// Workflow executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Maximum number of concurrently running workflow drivers.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Default per-step timeout in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Default whole-workflow timeout in milliseconds.
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
    /// How long completed workflow records are retained, in seconds.
    #[serde(default = "default_result_ttl")]
    pub result_ttl_seconds: u64,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_step_timeout_ms() -> u64 {
    120_000
}

fn default_total_timeout_ms() -> u64 {
    300_000
}

fn default_result_ttl() -> u64 {
    604_800 // 7 days
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            step_timeout_ms: default_step_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
            result_ttl_seconds: default_result_ttl(),
        }
    }
}

impl WorkflowSettings {
    /// Default per-step timeout as a [`Duration`].
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Default whole-workflow timeout as a [`Duration`].
    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL. Selects the Redis state backend when set.
    pub url: Option<String>,
}

/// Upstream provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// OpenAI-compatible endpoint configuration.
    #[serde(default)]
    pub openai: ProviderCredentials,
    /// Anthropic endpoint configuration.
    #[serde(default)]
    pub anthropic: ProviderCredentials,
}

/// Credentials for a single upstream provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
}
