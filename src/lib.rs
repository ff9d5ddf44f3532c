//! Prism API - Unified AI Inference Gateway
//!
//! This crate provides a single HTTP API over heterogeneous AI inference
//! providers (text, vision, image, video, audio, embedding) and composes
//! them into asynchronous multi-step workflows:
//!
//! - **Provider registry**: ordered per-category provider lists with
//!   round-robin rotation
//! - **Failover executor**: retries across ranked providers with exponential
//!   backoff and a classified error taxonomy
//! - **Workflow executor**: admission queue, bounded concurrency pool,
//!   sequential step drivers with transformer-based data threading
//! - **State manager**: in-memory or Redis-backed workflow records with a
//!   per-workflow event fan-out consumed over SSE
//!
//! # Architecture
//!
//! - [`config`]: Configuration management and environment loading
//! - [`providers`]: Provider traits, registry, failover executor, adapters
//! - [`state`]: Workflow state stores and the event bus
//! - [`workflow`]: Definitions, transformers, context, and the executor
//! - [`events`]: Workflow lifecycle event model
//! - [`gateway`]: Bearer authentication middleware
//! - [`api`]: HTTP API endpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use prism_api::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod gateway;
pub mod providers;
pub mod server;
pub mod state;
pub mod workflow;

use std::sync::Arc;

use config::AppConfig;
use providers::ProviderRegistry;
use state::StateStore;
use workflow::{WorkflowExecutor, WorkflowLibrary};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Provider registry, read-only after startup.
    pub registry: Arc<ProviderRegistry>,
    /// Workflow state backend (in-memory or Redis).
    pub state: Arc<dyn StateStore>,
    /// Workflow executor owning the admission queue and driver pool.
    pub executor: Arc<WorkflowExecutor>,
    /// Predefined workflow definitions, addressable by name.
    pub workflows: Arc<WorkflowLibrary>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("registry", &self.registry.stats())
            .field("queue", &self.executor.queue_len())
            .field("running", &self.executor.running_count())
            .finish()
    }
}
