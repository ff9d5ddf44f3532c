//! Workflow definitions and the fluent builder.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{StepStatus, WorkflowError};
use crate::providers::{Category, CategoryInput};

use super::context::WorkflowContext;

/// A user-supplied transformer mapping the workflow input and prior results
/// into a step's typed input.
pub type Transformer =
    Arc<dyn Fn(&serde_json::Value, &WorkflowContext) -> Result<CategoryInput, WorkflowError> + Send + Sync>;

/// A predicate deciding whether a step is skipped.
pub type SkipPredicate = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;

/// Input to one step: a literal value of the category's input type, or a
/// transformer evaluated against the running context.
#[derive(Clone)]
pub enum StepInput {
    /// Use the value verbatim.
    Literal(CategoryInput),
    /// Derive the value from the workflow input and prior results.
    Transform(Transformer),
}

impl std::fmt::Debug for StepInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(input) => f.debug_tuple("Literal").field(input).finish(),
            Self::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// One step of a workflow definition.
#[derive(Clone)]
pub struct StepDefinition {
    /// Step name; unique names are recommended (by-name lookup keeps the
    /// last write).
    pub name: String,
    /// Category the step dispatches to.
    pub category: Category,
    /// Step input.
    pub input: StepInput,
    /// Per-step timeout override.
    pub timeout: Option<Duration>,
    /// Optional skip predicate.
    pub skip_if: Option<SkipPredicate>,
}

impl StepDefinition {
    /// Create a step with no timeout override and no skip predicate.
    pub fn new(name: impl Into<String>, category: Category, input: StepInput) -> Self {
        Self {
            name: name.into(),
            category,
            input,
            timeout: None,
            skip_if: None,
        }
    }

    /// Override the step timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a skip predicate.
    #[must_use]
    pub fn with_skip_if(
        mut self,
        predicate: impl Fn(&WorkflowContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip_if = Some(Arc::new(predicate));
        self
    }
}

impl std::fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("input", &self.input)
            .field("timeout", &self.timeout)
            .field("skip_if", &self.skip_if.is_some())
            .finish()
    }
}

/// A named, executable workflow definition.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    /// Definition name, used for submission by name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Ordered steps; at least one.
    pub steps: Vec<StepDefinition>,
    /// Whole-workflow timeout override.
    pub total_timeout: Option<Duration>,
    /// Default per-step timeout override.
    pub default_step_timeout: Option<Duration>,
}

impl WorkflowDefinition {
    /// Start building a definition.
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            description: None,
            steps: Vec::new(),
            total_timeout: None,
            default_step_timeout: None,
        }
    }

    /// Pending step records for a fresh execution of this definition.
    #[must_use]
    pub fn step_statuses(&self) -> Vec<StepStatus> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepStatus::pending(i, step.name.clone(), step.category))
            .collect()
    }
}

/// Fluent assembler for [`WorkflowDefinition`].
#[derive(Debug)]
pub struct WorkflowBuilder {
    name: String,
    description: Option<String>,
    steps: Vec<StepDefinition>,
    total_timeout: Option<Duration>,
    default_step_timeout: Option<Duration>,
}

impl WorkflowBuilder {
    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the whole-workflow timeout.
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Set the default per-step timeout.
    #[must_use]
    pub fn default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout = Some(timeout);
        self
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a text step.
    #[must_use]
    pub fn text_step(self, name: impl Into<String>, input: StepInput) -> Self {
        self.step(StepDefinition::new(name, Category::Text, input))
    }

    /// Append a vision step.
    #[must_use]
    pub fn vision_step(self, name: impl Into<String>, input: StepInput) -> Self {
        self.step(StepDefinition::new(name, Category::Vision, input))
    }

    /// Append an image step.
    #[must_use]
    pub fn image_step(self, name: impl Into<String>, input: StepInput) -> Self {
        self.step(StepDefinition::new(name, Category::Image, input))
    }

    /// Append a video step.
    #[must_use]
    pub fn video_step(self, name: impl Into<String>, input: StepInput) -> Self {
        self.step(StepDefinition::new(name, Category::Video, input))
    }

    /// Append an audio step.
    #[must_use]
    pub fn audio_step(self, name: impl Into<String>, input: StepInput) -> Self {
        self.step(StepDefinition::new(name, Category::Audio, input))
    }

    /// Append an embedding step.
    #[must_use]
    pub fn embedding_step(self, name: impl Into<String>, input: StepInput) -> Self {
        self.step(StepDefinition::new(name, Category::Embedding, input))
    }

    /// Finish the definition. Fails if no step was added.
    pub fn build(self) -> anyhow::Result<WorkflowDefinition> {
        anyhow::ensure!(
            !self.steps.is_empty(),
            "workflow '{}' must define at least one step",
            self.name
        );
        Ok(WorkflowDefinition {
            name: self.name,
            description: self.description,
            steps: self.steps,
            total_timeout: self.total_timeout,
            default_step_timeout: self.default_step_timeout,
        })
    }
}
