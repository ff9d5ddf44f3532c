//! In-memory state backend.
//!
//! A keyed map under a `parking_lot` lock plus the shared event bus. A
//! background task sweeps terminal records older than the TTL every 60
//! seconds. Locks are released before any event delivery or await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::bus::EventBus;
use super::{apply_filter, ListFilter, StateStore, StatusMutation};
use crate::domain::WorkflowStatus;
use crate::events::WorkflowEvent;

/// Interval between TTL sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory workflow state store.
pub struct MemoryStateStore {
    records: RwLock<HashMap<String, WorkflowStatus>>,
    bus: EventBus,
    ttl: chrono::Duration,
}

impl MemoryStateStore {
    /// Create a store retaining terminal records for `ttl_seconds`.
    #[must_use]
    pub fn new(ttl_seconds: u64) -> Arc<Self> {
        Arc::new(Self {
            records: RwLock::new(HashMap::new()),
            bus: EventBus::new(),
            ttl: chrono::Duration::seconds(ttl_seconds as i64),
        })
    }

    /// Spawn the periodic TTL sweep for this store.
    pub fn start_sweeper(self: Arc<Self>) {
        let store = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match store.cleanup().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::debug!(removed = removed, "Swept expired workflow records");
                    }
                    Err(e) => tracing::warn!("State sweep failed: {e}"),
                }
            }
        });
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn create(&self, status: WorkflowStatus) -> anyhow::Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&status.id) {
            anyhow::bail!("workflow '{}' already exists", status.id);
        }
        records.insert(status.id.clone(), status);
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<WorkflowStatus>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn update(&self, id: &str, mutate: StatusMutation) -> anyhow::Result<()> {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(id) else {
            return Ok(());
        };
        if record.status.is_terminal() {
            tracing::warn!(workflow_id = %id, status = %record.status, "Ignoring update to terminal workflow");
            return Ok(());
        }
        mutate(record);
        record.updated_at = record.updated_at.max(Utc::now());
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.records.write().remove(id);
        self.bus.cleanup(id);
        Ok(())
    }

    fn emit(&self, event: WorkflowEvent) {
        self.bus.emit(&event);
    }

    fn subscribe(&self, id: &str) -> broadcast::Receiver<WorkflowEvent> {
        self.bus.subscribe(id)
    }

    async fn list(&self, filter: ListFilter) -> anyhow::Result<Vec<WorkflowStatus>> {
        let snapshot: Vec<WorkflowStatus> = self.records.read().values().cloned().collect();
        Ok(apply_filter(snapshot, &filter))
    }

    async fn cleanup(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - self.ttl;
        let expired: Vec<String> = {
            let records = self.records.read();
            records
                .values()
                .filter(|r| r.status.is_terminal() && r.updated_at < cutoff)
                .map(|r| r.id.clone())
                .collect()
        };

        let mut records = self.records.write();
        for id in &expired {
            records.remove(id);
            self.bus.cleanup(id);
        }
        Ok(expired.len())
    }
}
