//! Event bus for real-time workflow event fan-out.
//!
//! One broadcast channel per workflow id. The driver emits from a single
//! task, so per-id emission order is the order every subscriber observes.
//!
//! # Backpressure
//!
//! When a subscriber falls behind by more than `CHANNEL_CAPACITY` events,
//! older events are dropped for that subscriber rather than blocking the
//! driver; the receiver sees `broadcast::error::RecvError::Lagged`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::events::WorkflowEvent;

/// Channel capacity for workflow events.
const CHANNEL_CAPACITY: usize = 256;

/// Per-workflow pub/sub fan-out.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    /// Active broadcast channels indexed by workflow id.
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<WorkflowEvent>>>>,
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a workflow.
    ///
    /// Creates the channel if it does not exist yet. Dropping the returned
    /// receiver is the (idempotent) unsubscribe.
    pub fn subscribe(&self, workflow_id: &str) -> broadcast::Receiver<WorkflowEvent> {
        let mut channels = self.channels.write();

        let sender = channels.entry(workflow_id.to_string()).or_insert_with(|| {
            let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
            tx
        });

        sender.subscribe()
    }

    /// Deliver an event to every subscriber of its workflow id.
    ///
    /// Best-effort: emitting without subscribers is a no-op, and a lagging
    /// subscriber never blocks the caller. After a terminal event the
    /// channel is removed; subscribers drain what was already sent and then
    /// observe `Closed`.
    ///
    /// Returns the number of receivers the event was delivered to.
    pub fn emit(&self, event: &WorkflowEvent) -> usize {
        let terminal = event.kind.is_terminal();
        let workflow_id = event.workflow_id.clone();

        let delivered = {
            let channels = self.channels.read();
            match channels.get(&workflow_id) {
                Some(sender) => {
                    let count = sender.receiver_count();
                    let _ = sender.send(event.clone());
                    count
                }
                None => 0,
            }
        };

        if terminal {
            self.cleanup(&workflow_id);
        }

        delivered
    }

    /// Drop the channel for a workflow, releasing its subscribers.
    pub fn cleanup(&self, workflow_id: &str) {
        let mut channels = self.channels.write();
        channels.remove(workflow_id);
    }

    /// Number of active workflow channels.
    #[must_use]
    pub fn active_channels(&self) -> usize {
        self.channels.read().len()
    }

    /// Number of active subscribers for a workflow.
    #[must_use]
    pub fn subscriber_count(&self, workflow_id: &str) -> usize {
        self.channels
            .read()
            .get(workflow_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
