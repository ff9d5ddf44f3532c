//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api;
use crate::config::AppConfig;
use crate::gateway;
use crate::providers::{adapters, ProviderRegistry};
use crate::state::{MemoryStateStore, RedisStateStore, StateStore};
use crate::workflow::{ExecutorConfig, WorkflowExecutor, WorkflowLibrary};
use crate::AppState;

/// Gateway version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application with all routes and middleware.
pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let startup = Instant::now();
    tracing::info!(version = VERSION, "Initializing Prism API");

    let registry = Arc::new(ProviderRegistry::new());
    let registered = adapters::register_from_config(&registry, &config);
    if registered == 0 {
        tracing::warn!("No provider API keys configured; every upstream call will fail");
    }
    tracing::info!(
        providers = registered,
        categories = registry.categories().len(),
        "Provider registry populated"
    );

    let ttl = config.workflow.result_ttl_seconds;
    let state_store: Arc<dyn StateStore> = if let Some(url) = config.redis.url.as_deref() {
        match RedisStateStore::connect(url, ttl).await {
            Ok(store) => {
                tracing::info!(backend = "redis", url = %url, ttl_seconds = ttl, "State backend ready");
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    "Failed to connect to Redis: {e}. Falling back to in-memory state"
                );
                let store = MemoryStateStore::new(ttl);
                store.clone().start_sweeper();
                store
            }
        }
    } else {
        let store = MemoryStateStore::new(ttl);
        store.clone().start_sweeper();
        tracing::info!(backend = "memory", ttl_seconds = ttl, "State backend ready");
        store
    };

    let workflows = Arc::new(WorkflowLibrary::with_builtins());
    tracing::info!(definitions = workflows.len(), "Workflow library loaded");

    let executor = WorkflowExecutor::new(
        ExecutorConfig::from(&config.workflow),
        config.retry.clone(),
        Arc::clone(&registry),
        Arc::clone(&state_store),
    );
    tracing::info!(
        max_concurrent = config.workflow.max_concurrent,
        step_timeout_ms = config.workflow.step_timeout_ms,
        total_timeout_ms = config.workflow.total_timeout_ms,
        "Workflow executor ready"
    );

    let auth_enabled = config.gateway.api_key.is_some();
    let timeout_secs = config.server.timeout_secs;
    let state = AppState {
        config: Arc::new(config),
        registry,
        state: state_store,
        executor,
        workflows,
    };

    let app = api::create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            gateway::auth::auth_middleware,
        ))
        .with_state(state);

    tracing::info!(
        auth_enabled,
        request_timeout_secs = timeout_secs,
        startup_ms = startup.elapsed().as_millis() as u64,
        "Prism API server created"
    );

    Ok(app)
}
