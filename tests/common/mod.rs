//! Deterministic in-process providers and harness helpers shared by the
//! integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use prism_api::domain::WorkflowStatus;
use prism_api::providers::{
    ChatMessage, ChatProvider, ChunkStream, ImageProvider, ImageResult, MediaInput, Provider,
    ProviderRegistry, ProviderService, RetryConfig,
};
use prism_api::state::{MemoryStateStore, StateStore};
use prism_api::workflow::{ExecutorConfig, WorkflowExecutor};

/// One scripted invocation outcome for a chat provider.
#[derive(Clone)]
pub enum ChatOutcome {
    /// Succeed with these chunks.
    Chunks(Vec<&'static str>),
    /// Fail with this raw message.
    Fail(&'static str),
    /// Sleep, then succeed with these chunks.
    Delay(Duration, Vec<&'static str>),
}

/// Deterministic chat provider driven by a script.
///
/// When the script runs out, the last outcome repeats. Tracks invocation
/// counts and the peak number of concurrent calls.
pub struct ScriptedChat {
    script: Mutex<VecDeque<ChatOutcome>>,
    fallback: ChatOutcome,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedChat {
    pub fn new(script: Vec<ChatOutcome>, fallback: ChatOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Always succeed with the same chunks.
    pub fn succeeding(chunks: Vec<&'static str>) -> Arc<Self> {
        Self::new(Vec::new(), ChatOutcome::Chunks(chunks))
    }

    /// Always fail with the same message.
    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::new(Vec::new(), ChatOutcome::Fail(message))
    }

    /// Always sleep before succeeding.
    pub fn slow(delay: Duration, chunks: Vec<&'static str>) -> Arc<Self> {
        Self::new(Vec::new(), ChatOutcome::Delay(delay, chunks))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for ScriptedChat {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let result = match outcome {
            ChatOutcome::Fail(message) => Err(anyhow::anyhow!(message)),
            ChatOutcome::Chunks(chunks) => Ok(chunk_stream(chunks)),
            ChatOutcome::Delay(delay, chunks) => {
                tokio::time::sleep(delay).await;
                Ok(chunk_stream(chunks))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn chunk_stream(chunks: Vec<&'static str>) -> ChunkStream {
    Box::pin(futures::stream::iter(
        chunks.into_iter().map(|c| Ok(c.to_string())),
    ))
}

/// Deterministic image provider.
pub struct ScriptedImage {
    urls: Vec<&'static str>,
    failure: Option<&'static str>,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl ScriptedImage {
    pub fn succeeding(urls: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            urls,
            failure: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            urls: Vec::new(),
            failure: Some(message),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl ImageProvider for ScriptedImage {
    async fn generate(&self, input: MediaInput) -> anyhow::Result<ImageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(input.prompt);
        if let Some(message) = self.failure {
            anyhow::bail!(message);
        }
        Ok(ImageResult {
            urls: self.urls.iter().map(|u| (*u).to_string()).collect(),
            revised_prompt: None,
            metadata: None,
        })
    }
}

/// Wrap a chat provider as a named text provider.
pub fn text_provider(name: &str, chat: Arc<ScriptedChat>) -> Provider {
    Provider::new(name, ProviderService::Text(chat))
}

/// Wrap an image provider as a named image provider.
pub fn image_provider(name: &str, image: Arc<ScriptedImage>) -> Provider {
    Provider::new(name, ProviderService::Image(image))
}

/// Fast retry config for tests: three invocations, millisecond backoffs.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// In-process executor stack over an instrumented registry.
pub struct TestStack {
    pub registry: Arc<ProviderRegistry>,
    pub state: Arc<MemoryStateStore>,
    pub executor: Arc<WorkflowExecutor>,
}

/// Build a stack with the given concurrency bound and generous default
/// timeouts; definitions override timeouts per test.
pub fn stack(max_concurrent: usize, providers: Vec<Provider>) -> TestStack {
    let registry = Arc::new(ProviderRegistry::new());
    for provider in providers {
        registry.register(provider);
    }
    let state = MemoryStateStore::new(3600);
    let executor = WorkflowExecutor::new(
        ExecutorConfig {
            max_concurrent,
            step_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(10),
        },
        fast_retry(),
        Arc::clone(&registry),
        state.clone() as Arc<dyn StateStore>,
    );
    TestStack {
        registry,
        state,
        executor,
    }
}

/// Poll the store until the workflow reaches a terminal state.
pub async fn wait_terminal(state: &Arc<MemoryStateStore>, id: &str) -> WorkflowStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = state.get(id).await.unwrap() {
            if status.status.is_terminal() {
                return status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "workflow {id} did not reach a terminal state in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
