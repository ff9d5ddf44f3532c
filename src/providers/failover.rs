//! Failover executor: one logical operation against a category, cycling
//! providers with exponential backoff on retryable errors.
//!
//! Registry-backed executors rotate through the registry's shared
//! per-category cursor, so successive executions spread load even when
//! every call succeeds on the first attempt. The attempt counter counts
//! provider *invocations*: skipping an already-attempted provider while
//! untried providers remain advances the cursor without consuming an
//! attempt.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{classify, ProviderError, ProviderResult};
use super::registry::ProviderRegistry;
use super::{Category, CategoryInput, CategoryOutput, Provider, ProviderService};

/// Retry configuration, applied identically to every category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum provider invocations per logical operation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Backoff delay for the given zero-based attempt number:
    /// `min(base · 2^attempt, max)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

/// Successful execution: the category output plus the provider that served
/// it.
pub struct Execution {
    /// Category-shaped output. Text/vision yield the provider's lazy chunk
    /// stream; the caller decides whether to forward it raw or drain it.
    pub output: CategoryOutput,
    /// Name of the provider that produced the output.
    pub service: String,
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("output", &self.output)
            .field("service", &self.service)
            .finish()
    }
}

/// Where the executor's rotation cursor lives.
///
/// Executors built from the registry rotate through the registry's shared
/// per-category cursor, so successive executions spread load across the
/// process. Executors over an explicit list carry their own cursor.
enum Rotation {
    Local(AtomicUsize),
    Shared(Arc<ProviderRegistry>),
}

/// Per-category failover executor.
pub struct FailoverExecutor {
    category: Category,
    providers: Vec<Provider>,
    rotation: Rotation,
    config: RetryConfig,
}

impl FailoverExecutor {
    /// Create an executor over an explicit provider list with its own
    /// rotation cursor.
    #[must_use]
    pub fn new(category: Category, providers: Vec<Provider>, config: RetryConfig) -> Self {
        Self {
            category,
            providers,
            rotation: Rotation::Local(AtomicUsize::new(0)),
            config,
        }
    }

    /// Create an executor over the registry's current list for a category,
    /// rotating through the registry's shared cursor.
    #[must_use]
    pub fn from_registry(
        registry: &Arc<ProviderRegistry>,
        category: Category,
        config: RetryConfig,
    ) -> Self {
        Self {
            category,
            providers: registry.get_all(category),
            rotation: Rotation::Shared(Arc::clone(registry)),
            config,
        }
    }

    /// Advance the rotation and return the provider under the cursor.
    fn next_provider(&self) -> ProviderResult<Provider> {
        match &self.rotation {
            Rotation::Local(cursor) => {
                let idx = cursor.fetch_add(1, Ordering::Relaxed) % self.providers.len();
                Ok(self.providers[idx].clone())
            }
            Rotation::Shared(registry) => registry.get_next(self.category),
        }
    }

    /// Execute one logical operation, failing over across providers.
    ///
    /// Retryable failures rotate to the next provider after an exponential
    /// backoff; fatal failures (`AUTH_FAILED`, `INVALID_REQUEST`) surface
    /// immediately. When all attempts are exhausted a synthesized
    /// `SERVICE_ERROR` reports every attempted provider and cause.
    pub async fn execute(&self, input: &CategoryInput) -> ProviderResult<Execution> {
        if self.providers.is_empty() {
            return Err(ProviderError::service_error(
                "registry",
                format!("No providers available for category '{}'", self.category),
            ));
        }

        let mut attempted: HashSet<String> = HashSet::new();
        let mut attempted_order: Vec<String> = Vec::new();
        let mut errors: Vec<ProviderError> = Vec::new();
        let mut attempt = 0u32;

        while attempt < self.config.max_retries {
            let provider = self.next_provider()?;

            // Skip an already-attempted provider while untried ones remain;
            // the skip does not consume the attempt.
            if attempted.contains(&provider.name) && attempted.len() < self.providers.len() {
                continue;
            }

            if attempted.insert(provider.name.clone()) {
                attempted_order.push(provider.name.clone());
            }

            tracing::debug!(
                category = %self.category,
                service = %provider.name,
                attempt = attempt,
                "Invoking provider"
            );

            match self.invoke(&provider, input).await {
                Ok(output) => {
                    return Ok(Execution {
                        output,
                        service: provider.name.clone(),
                    });
                }
                Err(raw) => {
                    let classified = classify(&provider.name, raw);
                    let fatal = !classified.code.is_retryable();
                    tracing::warn!(
                        category = %self.category,
                        service = %provider.name,
                        code = %classified.code,
                        attempt = attempt,
                        fatal = fatal,
                        "Provider call failed: {}",
                        classified.message
                    );
                    if fatal {
                        return Err(classified);
                    }
                    errors.push(classified);
                }
            }

            if attempt + 1 < self.config.max_retries {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
            attempt += 1;
        }

        Err(ProviderError::all_failed(
            self.category.as_str(),
            &attempted_order,
            &errors,
        ))
    }

    /// Dispatch the typed input to the provider's category operation.
    async fn invoke(
        &self,
        provider: &Provider,
        input: &CategoryInput,
    ) -> anyhow::Result<CategoryOutput> {
        match (&provider.service, input) {
            (ProviderService::Text(p) | ProviderService::Vision(p), CategoryInput::Chat(msgs)) => {
                Ok(CategoryOutput::Stream(p.complete(msgs.clone()).await?))
            }
            (ProviderService::Image(p), CategoryInput::Image(input)) => {
                Ok(CategoryOutput::Image(p.generate(input.clone()).await?))
            }
            (ProviderService::Video(p), CategoryInput::Video(input)) => {
                Ok(CategoryOutput::Video(p.generate(input.clone()).await?))
            }
            (ProviderService::Audio(p), CategoryInput::Audio(input)) => {
                Ok(CategoryOutput::Audio(p.synthesize(input.clone()).await?))
            }
            (ProviderService::Embedding(p), CategoryInput::Embedding(input)) => {
                Ok(CategoryOutput::Embedding(p.embed(input.clone()).await?))
            }
            _ => anyhow::bail!(
                "invalid input type for category '{}' provider '{}'",
                self.category,
                provider.name
            ),
        }
    }
}

impl std::fmt::Debug for FailoverExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverExecutor")
            .field("category", &self.category)
            .field("providers", &self.providers.len())
            .field("config", &self.config)
            .finish()
    }
}
