//! Workflow status records and their state machines.
//!
//! A [`WorkflowStatus`] is the persisted, shareable record of one workflow
//! execution; the driver is its only writer. Terminal states are sticky:
//! once a workflow or step reaches one, nothing but TTL metadata changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::{Category, ErrorCode, ProviderError};

/// Workflow lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// Created, not yet admitted.
    Pending,
    /// Waiting for a driver slot.
    Queued,
    /// Driver executing steps.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
}

impl WorkflowState {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown workflow state '{other}'")),
        }
    }
}

/// Step lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// Not yet reached.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
    /// Skipped by its predicate. Terminal.
    Skipped,
}

impl StepState {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Error attached to a failed step or workflow.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct WorkflowError {
    /// Human-readable message.
    pub message: String,
    /// Classified code, when the failure came from a provider call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Index of the step that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    /// Provider attributed to the failure, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl WorkflowError {
    /// Wrap a classified provider error, attributing it to a step.
    #[must_use]
    pub fn from_provider(err: ProviderError, step: usize) -> Self {
        Self {
            message: err.message.clone(),
            code: Some(err.code),
            step: Some(step),
            service: Some(err.service),
        }
    }

    /// An input-shape rejection raised by a transformer.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(ErrorCode::InvalidRequest),
            step: None,
            service: None,
        }
    }

    /// A step deadline expiring.
    #[must_use]
    pub fn step_timeout(step: usize, limit_ms: u128) -> Self {
        Self {
            message: format!("Step {step} timed out after {limit_ms}ms"),
            code: Some(ErrorCode::Timeout),
            step: Some(step),
            service: None,
        }
    }

    /// Attach the step index, if not already set.
    #[must_use]
    pub fn at_step(mut self, step: usize) -> Self {
        self.step.get_or_insert(step);
        self
    }
}

/// Persisted status of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStatus {
    /// Position in the definition; `steps[i].index == i`.
    pub index: usize,
    /// Step name from the definition.
    pub name: String,
    /// Category the step dispatches to.
    pub category: Category,
    /// Current state.
    pub status: StepState,
    /// Provider that served the step, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Step result, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
    /// When execution began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Execution duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StepStatus {
    /// Create a pending step record.
    #[must_use]
    pub fn pending(index: usize, name: impl Into<String>, category: Category) -> Self {
        Self {
            index,
            name: name.into(),
            category,
            status: StepState::Pending,
            service: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Mark the step running.
    pub fn start(&mut self) {
        self.status = StepState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the step completed with its provider and result.
    pub fn complete(&mut self, service: impl Into<String>, result: serde_json::Value) {
        let now = Utc::now();
        self.status = StepState::Completed;
        self.service = Some(service.into());
        self.result = Some(result);
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|s| now.signed_duration_since(s).num_milliseconds().max(0) as u64);
    }

    /// Mark the step failed.
    pub fn fail(&mut self, error: WorkflowError) {
        let now = Utc::now();
        self.status = StepState::Failed;
        self.service = error.service.clone();
        self.error = Some(error);
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|s| now.signed_duration_since(s).num_milliseconds().max(0) as u64);
    }

    /// Mark the step skipped.
    pub fn skip(&mut self) {
        self.status = StepState::Skipped;
    }
}

/// Persisted status of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    /// Workflow id (UUID).
    pub id: String,
    /// Definition name.
    pub name: String,
    /// Current state.
    pub status: WorkflowState,
    /// Index of the step currently (or last) being executed.
    pub current_step: usize,
    /// Number of steps in the definition.
    pub total_steps: usize,
    /// Per-step records, index-aligned with the definition.
    pub steps: Vec<StepStatus>,
    /// Original workflow input.
    pub input: serde_json::Value,
    /// Final result, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; monotonic non-decreasing.
    pub updated_at: DateTime<Utc>,
    /// Completion time, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStatus {
    /// Create a pending record with every step pending.
    #[must_use]
    pub fn new(
        id: String,
        name: impl Into<String>,
        input: serde_json::Value,
        steps: Vec<StepStatus>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            status: WorkflowState::Pending,
            current_step: 0,
            total_steps: steps.len(),
            steps,
            input,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Transition to queued.
    pub fn mark_queued(&mut self) {
        self.status = WorkflowState::Queued;
        self.updated_at = Utc::now();
    }

    /// Transition to running.
    pub fn mark_running(&mut self) {
        self.status = WorkflowState::Running;
        self.updated_at = Utc::now();
    }

    /// Transition to completed with a result.
    pub fn complete(&mut self, result: serde_json::Value) {
        let now = Utc::now();
        self.status = WorkflowState::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Transition to failed.
    pub fn fail(&mut self, error: WorkflowError) {
        let now = Utc::now();
        self.status = WorkflowState::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Mark step `index` running and advance `current_step`.
    pub fn start_step(&mut self, index: usize) {
        self.current_step = index;
        if let Some(step) = self.steps.get_mut(index) {
            step.start();
        }
        self.updated_at = Utc::now();
    }

    /// Mark step `index` completed.
    pub fn complete_step(
        &mut self,
        index: usize,
        service: impl Into<String>,
        result: serde_json::Value,
    ) {
        if let Some(step) = self.steps.get_mut(index) {
            step.complete(service, result);
        }
        self.updated_at = Utc::now();
    }

    /// Mark step `index` failed.
    pub fn fail_step(&mut self, index: usize, error: WorkflowError) {
        if let Some(step) = self.steps.get_mut(index) {
            step.fail(error);
        }
        self.updated_at = Utc::now();
    }

    /// Mark step `index` skipped and advance `current_step`.
    pub fn skip_step(&mut self, index: usize) {
        self.current_step = index;
        if let Some(step) = self.steps.get_mut(index) {
            step.skip();
        }
        self.updated_at = Utc::now();
    }
}
