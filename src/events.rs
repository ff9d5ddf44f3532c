//! Workflow lifecycle event model.
//!
//! Events are immutable records broadcast to zero or more subscribers of a
//! workflow id. For a given id, subscribers observe events in emission
//! order, and nothing is emitted after a terminal event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::WorkflowError;
use crate::providers::Category;

/// Event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Workflow admitted behind the concurrency limit.
    #[serde(rename = "workflow:queued")]
    WorkflowQueued,
    /// Driver launched.
    #[serde(rename = "workflow:started")]
    WorkflowStarted,
    /// Workflow finished successfully. Terminal.
    #[serde(rename = "workflow:complete")]
    WorkflowComplete,
    /// Workflow failed. Terminal.
    #[serde(rename = "workflow:failed")]
    WorkflowFailed,
    /// Step began executing.
    #[serde(rename = "step:started")]
    StepStarted,
    /// Step finished successfully.
    #[serde(rename = "step:complete")]
    StepComplete,
    /// Step failed (the workflow fails with it).
    #[serde(rename = "step:failed")]
    StepFailed,
    /// Step skipped by its predicate.
    #[serde(rename = "step:skipped")]
    StepSkipped,
}

impl EventKind {
    /// Wire representation of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowQueued => "workflow:queued",
            Self::WorkflowStarted => "workflow:started",
            Self::WorkflowComplete => "workflow:complete",
            Self::WorkflowFailed => "workflow:failed",
            Self::StepStarted => "step:started",
            Self::StepComplete => "step:complete",
            Self::StepFailed => "step:failed",
            Self::StepSkipped => "step:skipped",
        }
    }

    /// Whether no further events may follow this one for the same workflow.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::WorkflowComplete | Self::WorkflowFailed)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow state-transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Workflow this event belongs to.
    pub workflow_id: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Type-dependent payload.
    pub data: serde_json::Value,
}

impl WorkflowEvent {
    fn new(kind: EventKind, workflow_id: &str, data: serde_json::Value) -> Self {
        Self {
            kind,
            workflow_id: workflow_id.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// Workflow was queued behind the concurrency limit.
    pub fn queued(workflow_id: &str, name: &str, position: usize) -> Self {
        Self::new(
            EventKind::WorkflowQueued,
            workflow_id,
            serde_json::json!({ "name": name, "position": position }),
        )
    }

    /// Driver launched for the workflow.
    pub fn started(workflow_id: &str, name: &str, total_steps: usize) -> Self {
        Self::new(
            EventKind::WorkflowStarted,
            workflow_id,
            serde_json::json!({ "name": name, "total_steps": total_steps }),
        )
    }

    /// Workflow completed with a result.
    pub fn complete(workflow_id: &str, result: &serde_json::Value, duration_ms: u64) -> Self {
        Self::new(
            EventKind::WorkflowComplete,
            workflow_id,
            serde_json::json!({ "result": result, "duration_ms": duration_ms }),
        )
    }

    /// Workflow failed.
    pub fn failed(workflow_id: &str, error: &WorkflowError, duration_ms: u64) -> Self {
        Self::new(
            EventKind::WorkflowFailed,
            workflow_id,
            serde_json::json!({ "error": error, "duration_ms": duration_ms }),
        )
    }

    /// Step began executing.
    pub fn step_started(workflow_id: &str, index: usize, name: &str, category: Category) -> Self {
        Self::new(
            EventKind::StepStarted,
            workflow_id,
            serde_json::json!({ "step": index, "name": name, "category": category }),
        )
    }

    /// Step completed.
    pub fn step_complete(
        workflow_id: &str,
        index: usize,
        name: &str,
        service: &str,
        result: &serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self::new(
            EventKind::StepComplete,
            workflow_id,
            serde_json::json!({
                "step": index,
                "name": name,
                "service": service,
                "result": result,
                "duration_ms": duration_ms,
            }),
        )
    }

    /// Step failed.
    pub fn step_failed(workflow_id: &str, index: usize, name: &str, error: &WorkflowError) -> Self {
        Self::new(
            EventKind::StepFailed,
            workflow_id,
            serde_json::json!({ "step": index, "name": name, "error": error }),
        )
    }

    /// Step skipped by its predicate.
    pub fn step_skipped(workflow_id: &str, index: usize, name: &str, reason: &str) -> Self {
        Self::new(
            EventKind::StepSkipped,
            workflow_id,
            serde_json::json!({ "step": index, "name": name, "reason": reason }),
        )
    }
}
