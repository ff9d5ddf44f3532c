//! Workflow state management.
//!
//! The [`StateStore`] trait is the abstract contract both backends
//! implement: an in-memory store with a periodic TTL sweep, and a Redis
//! store with key TTLs and best-effort pub/sub. Either way, the store also
//! owns the per-workflow event fan-out consumed by SSE subscribers.

pub mod bus;
pub mod memory;
pub mod redis;

pub use bus::EventBus;
pub use memory::MemoryStateStore;
pub use self::redis::RedisStateStore;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::domain::{WorkflowState, WorkflowStatus};
use crate::events::WorkflowEvent;

/// A typed mutation applied to a stored record under the store's exclusion.
pub type StatusMutation = Box<dyn FnOnce(&mut WorkflowStatus) + Send>;

/// Filter for [`StateStore::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    /// Only records in this state.
    pub status: Option<WorkflowState>,
    /// Truncate to at most this many records.
    pub limit: Option<usize>,
}

/// Abstract workflow state backend.
///
/// Writers (the executor's drivers) and readers (HTTP handlers, SSE
/// subscribers) share the store; per-id event order is preserved and the
/// record write for a transition happens-before the event announcing it.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a new record. Fails if the id already exists.
    async fn create(&self, status: WorkflowStatus) -> anyhow::Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> anyhow::Result<Option<WorkflowStatus>>;

    /// Apply a mutation to a record and stamp `updated_at`.
    ///
    /// No-op if the record is missing. Records already in a terminal state
    /// are never mutated (terminal states are sticky).
    async fn update(&self, id: &str, mutate: StatusMutation) -> anyhow::Result<()>;

    /// Remove a record and release its subscribers.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;

    /// Deliver an event to every subscriber of its workflow id.
    ///
    /// Best-effort and non-blocking for the caller.
    fn emit(&self, event: WorkflowEvent);

    /// Subscribe to events for a workflow id.
    ///
    /// Dropping the receiver is the idempotent unsubscribe.
    fn subscribe(&self, id: &str) -> broadcast::Receiver<WorkflowEvent>;

    /// Snapshot of records matching the filter, newest first.
    async fn list(&self, filter: ListFilter) -> anyhow::Result<Vec<WorkflowStatus>>;

    /// Remove terminal records whose `updated_at` is older than the TTL.
    ///
    /// Idempotent on a quiescent store. Returns the number of records
    /// removed.
    async fn cleanup(&self) -> anyhow::Result<usize>;
}

/// Sort newest-first and apply a [`ListFilter`] to a record snapshot.
pub(crate) fn apply_filter(
    mut records: Vec<WorkflowStatus>,
    filter: &ListFilter,
) -> Vec<WorkflowStatus> {
    if let Some(status) = filter.status {
        records.retain(|r| r.status == status);
    }
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if let Some(limit) = filter.limit {
        records.truncate(limit);
    }
    records
}
