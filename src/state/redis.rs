//! Redis state backend.
//!
//! Each status is serialized as a single value under `workflow:<id>` with a
//! TTL of `result_ttl_seconds`; an auxiliary set `workflow:active` tracks
//! non-terminal ids. Events are published on `workflow:events:<id>` for
//! external observers AND always delivered to local subscribers through the
//! in-process bus; the publish is fire-and-forget and its health never
//! affects local delivery.
//!
//! `list` reads via a key scan that is not atomic with writes; a record may
//! transition to terminal mid-scan. This is an accepted inconsistency.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use super::bus::EventBus;
use super::{apply_filter, ListFilter, StateStore, StatusMutation};
use crate::domain::WorkflowStatus;
use crate::events::WorkflowEvent;

/// Set of non-terminal workflow ids.
const ACTIVE_SET: &str = "workflow:active";

fn record_key(id: &str) -> String {
    format!("workflow:{id}")
}

fn channel_key(id: &str) -> String {
    format!("workflow:events:{id}")
}

/// Whether a scanned key names a workflow record (as opposed to the active
/// set or an event channel).
fn is_record_key(key: &str) -> bool {
    key != ACTIVE_SET && !key.starts_with("workflow:events:")
}

/// Redis-backed workflow state store.
pub struct RedisStateStore {
    conn: ConnectionManager,
    bus: EventBus,
    ttl_seconds: u64,
}

impl RedisStateStore {
    /// Connect to Redis and build a store retaining records for
    /// `ttl_seconds`.
    pub async fn connect(url: &str, ttl_seconds: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            bus: EventBus::new(),
            ttl_seconds,
        })
    }

    /// Collect every workflow record key currently in Redis.
    async fn scan_record_keys(&self) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("workflow:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch.into_iter().filter(|k| is_record_key(k)));
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    /// Fetch and parse one record; `None` if the key vanished mid-scan or
    /// the value does not parse.
    async fn fetch(&self, key: &str) -> Option<WorkflowStatus> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.ok()?;
        raw.and_then(|v| serde_json::from_str(&v).ok())
    }

    async fn write(&self, status: &WorkflowStatus) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(status)?;
        let _: () = redis::cmd("SET")
            .arg(record_key(&status.id))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn create(&self, status: WorkflowStatus) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&status)?;
        let created: Option<String> = redis::cmd("SET")
            .arg(record_key(&status.id))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await?;
        if created.is_none() {
            anyhow::bail!("workflow '{}' already exists", status.id);
        }
        let _: () = conn.sadd(ACTIVE_SET, &status.id).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<WorkflowStatus>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(record_key(id)).await?;
        match raw {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, mutate: StatusMutation) -> anyhow::Result<()> {
        let Some(mut record) = self.get(id).await? else {
            return Ok(());
        };
        if record.status.is_terminal() {
            tracing::warn!(workflow_id = %id, status = %record.status, "Ignoring update to terminal workflow");
            return Ok(());
        }

        mutate(&mut record);
        record.updated_at = record.updated_at.max(Utc::now());
        self.write(&record).await?;

        if record.status.is_terminal() {
            let mut conn = self.conn.clone();
            let _: () = conn.srem(ACTIVE_SET, id).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(record_key(id)).await?;
        let _: () = conn.srem(ACTIVE_SET, id).await?;
        self.bus.cleanup(id);
        Ok(())
    }

    fn emit(&self, event: WorkflowEvent) {
        // Local subscribers first; their delivery never depends on Redis.
        self.bus.emit(&event);

        // Cross-process publish is a fire-and-forget enhancement.
        let mut conn = self.conn.clone();
        let channel = channel_key(&event.workflow_id);
        tokio::spawn(async move {
            let payload = match serde_json::to_string(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!("Failed to serialize event for publish: {e}");
                    return;
                }
            };
            if let Err(e) = conn.publish::<_, _, ()>(&channel, payload).await {
                tracing::debug!(channel = %channel, "Event publish failed: {e}");
            }
        });
    }

    fn subscribe(&self, id: &str) -> broadcast::Receiver<WorkflowEvent> {
        self.bus.subscribe(id)
    }

    async fn list(&self, filter: ListFilter) -> anyhow::Result<Vec<WorkflowStatus>> {
        let keys = self.scan_record_keys().await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.fetch(&key).await {
                records.push(record);
            }
        }
        Ok(apply_filter(records, &filter))
    }

    async fn cleanup(&self) -> anyhow::Result<usize> {
        // Key TTLs already prune expired records; this pass only covers
        // terminal records whose TTL was refreshed by a late write.
        let cutoff = Utc::now() - chrono::Duration::seconds(self.ttl_seconds as i64);
        let mut removed = 0;
        for key in self.scan_record_keys().await? {
            let Some(record) = self.fetch(&key).await else {
                continue;
            };
            if record.status.is_terminal() && record.updated_at < cutoff {
                self.delete(&record.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(record_key("abc"), "workflow:abc");
        assert_eq!(channel_key("abc"), "workflow:events:abc");
    }

    #[test]
    fn test_scan_filter_excludes_aux_keys() {
        assert!(is_record_key("workflow:123"));
        assert!(!is_record_key("workflow:active"));
        assert!(!is_record_key("workflow:events:123"));
    }
}
