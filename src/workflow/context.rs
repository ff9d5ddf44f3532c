//! Ephemeral per-execution workflow context.
//!
//! The context is created when a driver begins and discarded when it
//! returns; it is never persisted (the step records carry the same
//! information for post-hoc inspection). It threads completed step results
//! to later steps' transformers, by index and by name.

use std::collections::HashMap;

use super::StepValue;

/// Per-execution context handed to transformers and skip predicates.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Workflow id.
    pub workflow_id: String,
    /// Definition name.
    pub workflow_name: String,
    /// Original workflow input.
    pub input: serde_json::Value,
    /// Index of the step currently being evaluated.
    pub current_step: usize,
    /// Completed results by step index.
    results: Vec<Option<StepValue>>,
    /// Completed results by step name; duplicate names keep the last write.
    results_by_name: HashMap<String, StepValue>,
}

impl WorkflowContext {
    /// Create a context for a workflow with `total_steps` steps.
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        input: serde_json::Value,
        total_steps: usize,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            input,
            current_step: 0,
            results: vec![None; total_steps],
            results_by_name: HashMap::new(),
        }
    }

    /// Record a completed step's result under its index and name.
    pub fn record(&mut self, index: usize, name: &str, value: StepValue) {
        if let Some(slot) = self.results.get_mut(index) {
            *slot = Some(value.clone());
        }
        self.results_by_name.insert(name.to_string(), value);
    }

    /// Result of the immediately previous step, if it produced one.
    #[must_use]
    pub fn previous_result(&self) -> Option<&StepValue> {
        let prev = self.current_step.checked_sub(1)?;
        self.result(prev)
    }

    /// Result of step `index`, if it produced one.
    #[must_use]
    pub fn result(&self, index: usize) -> Option<&StepValue> {
        self.results.get(index)?.as_ref()
    }

    /// Result of the step named `name`, if it produced one.
    #[must_use]
    pub fn result_by_name(&self, name: &str) -> Option<&StepValue> {
        self.results_by_name.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_threading() {
        let mut ctx = WorkflowContext::new("wf-1", "demo", serde_json::json!("in"), 3);
        ctx.record(0, "draft", StepValue::Text("a red cube".to_string()));

        ctx.current_step = 1;
        assert_eq!(
            ctx.previous_result().and_then(StepValue::as_text),
            Some("a red cube")
        );
        assert_eq!(ctx.result(0).and_then(StepValue::as_text), Some("a red cube"));
        assert_eq!(
            ctx.result_by_name("draft").and_then(StepValue::as_text),
            Some("a red cube")
        );
    }

    #[test]
    fn test_previous_result_absent() {
        let ctx = WorkflowContext::new("wf-1", "demo", serde_json::json!(null), 2);
        // First step has no predecessor.
        assert!(ctx.previous_result().is_none());

        let mut ctx = ctx;
        ctx.current_step = 1;
        // Predecessor exists but produced nothing (e.g. skipped).
        assert!(ctx.previous_result().is_none());
    }

    #[test]
    fn test_duplicate_names_keep_last_write() {
        let mut ctx = WorkflowContext::new("wf-1", "demo", serde_json::json!(null), 2);
        ctx.record(0, "step", StepValue::Text("first".to_string()));
        ctx.record(1, "step", StepValue::Text("second".to_string()));

        assert_eq!(
            ctx.result_by_name("step").and_then(StepValue::as_text),
            Some("second")
        );
        assert_eq!(ctx.result(0).and_then(StepValue::as_text), Some("first"));
    }
}
