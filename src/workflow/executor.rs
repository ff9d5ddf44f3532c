//! Workflow executor: admission queue, bounded concurrency pool, and the
//! per-workflow driver.
//!
//! Each admitted workflow is owned by exactly one driver task. Drivers walk
//! the step list sequentially, resolve inputs through transformers, call
//! the per-category failover executor, persist every transition, and emit
//! the corresponding lifecycle event after the write (persistence
//! happens-before the event announcing it).
//!
//! Admission is atomic under a single scheduler lock: submit either claims
//! a driver slot or appends to the FIFO queue, and every driver exit drains
//! the queue head while capacity remains.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::WorkflowSettings;
use crate::domain::{WorkflowError, WorkflowStatus};
use crate::events::WorkflowEvent;
use crate::providers::{classify, CategoryOutput, FailoverExecutor, ProviderRegistry, RetryConfig};
use crate::state::StateStore;

use super::definition::{StepDefinition, StepInput, WorkflowDefinition};
use super::transform;
use super::{StepValue, WorkflowContext};

/// Executor limits, shared by every workflow unless its definition
/// overrides a timeout.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum concurrently running drivers.
    pub max_concurrent: usize,
    /// Default per-step timeout.
    pub step_timeout: Duration,
    /// Default whole-workflow timeout.
    pub total_timeout: Duration,
}

impl From<&WorkflowSettings> for ExecutorConfig {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent,
            step_timeout: settings.step_timeout(),
            total_timeout: settings.total_timeout(),
        }
    }
}

/// A submission waiting for a driver slot.
struct QueuedJob {
    id: String,
    definition: Arc<WorkflowDefinition>,
    input: serde_json::Value,
}

/// Admission state: the running set and the FIFO queue, mutated together
/// under one lock so capacity checks are atomic.
#[derive(Default)]
struct Scheduler {
    running: HashSet<String>,
    queue: VecDeque<QueuedJob>,
}

/// Bounded-concurrency workflow executor.
pub struct WorkflowExecutor {
    config: ExecutorConfig,
    retry: RetryConfig,
    registry: Arc<ProviderRegistry>,
    state: Arc<dyn StateStore>,
    scheduler: Mutex<Scheduler>,
    /// Self-handle for spawning driver tasks.
    this: std::sync::Weak<Self>,
}

impl WorkflowExecutor {
    /// Create an executor over the given registry and state backend.
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        retry: RetryConfig,
        registry: Arc<ProviderRegistry>,
        state: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            retry,
            registry,
            state,
            scheduler: Mutex::new(Scheduler::default()),
            this: this.clone(),
        })
    }

    /// Number of submissions waiting for a driver slot.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.scheduler.lock().queue.len()
    }

    /// Number of drivers currently running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.scheduler.lock().running.len()
    }

    /// Submit a workflow for execution and return its id immediately.
    ///
    /// The new record is persisted as `pending`; the workflow either claims
    /// a driver slot right away or is appended to the queue as `queued`.
    pub async fn submit(
        &self,
        definition: Arc<WorkflowDefinition>,
        input: serde_json::Value,
    ) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let status = WorkflowStatus::new(
            id.clone(),
            definition.name.clone(),
            input.clone(),
            definition.step_statuses(),
        );
        self.state.create(status).await?;

        let admitted = {
            let mut sched = self.scheduler.lock();
            if sched.running.len() < self.config.max_concurrent {
                sched.running.insert(id.clone());
                true
            } else {
                false
            }
        };

        if admitted {
            tracing::info!(workflow_id = %id, name = %definition.name, "Workflow admitted");
            self.launch(QueuedJob {
                id: id.clone(),
                definition,
                input,
            });
        } else {
            // Persist the queued transition before the job becomes poppable
            // so a concurrently exiting driver cannot observe it first.
            self.state
                .update(&id, Box::new(WorkflowStatus::mark_queued))
                .await?;
            let position = {
                let mut sched = self.scheduler.lock();
                sched.queue.push_back(QueuedJob {
                    id: id.clone(),
                    definition: Arc::clone(&definition),
                    input,
                });
                sched.queue.len()
            };
            tracing::info!(workflow_id = %id, name = %definition.name, position, "Workflow queued");
            self.state
                .emit(WorkflowEvent::queued(&id, &definition.name, position));
            // Capacity may have freed while we were persisting.
            self.dispatch_queued();
        }

        Ok(id)
    }

    /// Launch a driver task for an admitted job.
    fn launch(&self, job: QueuedJob) {
        let Some(executor) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            executor.drive(&job.id, &job.definition, job.input).await;
            {
                let mut sched = executor.scheduler.lock();
                sched.running.remove(&job.id);
            }
            executor.dispatch_queued();
        });
    }

    /// Drain the queue head while driver slots remain.
    fn dispatch_queued(&self) {
        let admitted = {
            let mut sched = self.scheduler.lock();
            let mut admitted = Vec::new();
            while sched.running.len() < self.config.max_concurrent {
                let Some(job) = sched.queue.pop_front() else {
                    break;
                };
                sched.running.insert(job.id.clone());
                admitted.push(job);
            }
            admitted
        };
        for job in admitted {
            tracing::info!(workflow_id = %job.id, "Workflow dequeued");
            self.launch(job);
        }
    }

    /// Per-workflow driver: runs every step in order and settles the
    /// record with a terminal transition.
    async fn drive(
        &self,
        id: &str,
        definition: &WorkflowDefinition,
        input: serde_json::Value,
    ) {
        let started = Instant::now();

        if let Err(e) = self
            .state
            .update(id, Box::new(WorkflowStatus::mark_running))
            .await
        {
            tracing::error!(workflow_id = %id, "Failed to persist running state: {e}");
        }
        self.state.emit(WorkflowEvent::started(
            id,
            &definition.name,
            definition.steps.len(),
        ));

        let outcome = self.run_steps(id, definition, input, started).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                let persisted = result.clone();
                if let Err(e) = self
                    .state
                    .update(id, Box::new(move |s| s.complete(persisted)))
                    .await
                {
                    tracing::error!(workflow_id = %id, "Failed to persist completion: {e}");
                }
                self.state
                    .emit(WorkflowEvent::complete(id, &result, duration_ms));
                tracing::info!(workflow_id = %id, duration_ms, "Workflow completed");
            }
            Err(error) => {
                let persisted = error.clone();
                if let Err(e) = self
                    .state
                    .update(id, Box::new(move |s| s.fail(persisted)))
                    .await
                {
                    tracing::error!(workflow_id = %id, "Failed to persist failure: {e}");
                }
                self.state
                    .emit(WorkflowEvent::failed(id, &error, duration_ms));
                tracing::warn!(
                    workflow_id = %id,
                    step = error.step,
                    code = ?error.code,
                    duration_ms,
                    "Workflow failed: {}",
                    error.message
                );
            }
        }
    }

    /// Evaluate the step list; the workflow result is the last step's
    /// result (null if that step was skipped).
    async fn run_steps(
        &self,
        id: &str,
        definition: &WorkflowDefinition,
        input: serde_json::Value,
        started: Instant,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut ctx =
            WorkflowContext::new(id, &definition.name, input, definition.steps.len());
        let total_budget = definition
            .total_timeout
            .unwrap_or(self.config.total_timeout);
        let deadline = started + total_budget;

        for (index, step) in definition.steps.iter().enumerate() {
            ctx.current_step = index;

            if let Some(skip) = &step.skip_if {
                if skip(&ctx) {
                    let _ = self
                        .state
                        .update(id, Box::new(move |s| s.skip_step(index)))
                        .await;
                    self.state.emit(WorkflowEvent::step_skipped(
                        id,
                        index,
                        &step.name,
                        "skip predicate evaluated true",
                    ));
                    tracing::debug!(workflow_id = %id, step = index, "Step skipped");
                    continue;
                }
            }

            let _ = self
                .state
                .update(id, Box::new(move |s| s.start_step(index)))
                .await;
            self.state
                .emit(WorkflowEvent::step_started(id, index, &step.name, step.category));

            // The step deadline is the per-step limit clamped by whatever
            // remains of the total budget, so whichever timer is tighter
            // fires first.
            let step_limit = step
                .timeout
                .or(definition.default_step_timeout)
                .unwrap_or(self.config.step_timeout);
            let limit = step_limit.min(deadline.saturating_duration_since(Instant::now()));
            let step_started = Instant::now();

            let outcome = tokio::time::timeout(limit, self.run_step(step, index, &ctx)).await;

            let (service, value) = match outcome {
                Ok(Ok(pair)) => pair,
                Ok(Err(error)) => {
                    return Err(self.settle_step_failure(id, index, &step.name, error).await);
                }
                Err(_) => {
                    let error = WorkflowError::step_timeout(index, limit.as_millis());
                    return Err(self.settle_step_failure(id, index, &step.name, error).await);
                }
            };

            let duration_ms = step_started.elapsed().as_millis() as u64;
            let result_json = value.to_json();
            ctx.record(index, &step.name, value);

            {
                let service = service.clone();
                let result_json = result_json.clone();
                let _ = self
                    .state
                    .update(
                        id,
                        Box::new(move |s| s.complete_step(index, service, result_json)),
                    )
                    .await;
            }
            self.state.emit(WorkflowEvent::step_complete(
                id,
                index,
                &step.name,
                &service,
                &result_json,
                duration_ms,
            ));
            tracing::debug!(
                workflow_id = %id,
                step = index,
                service = %service,
                duration_ms,
                "Step completed"
            );
        }

        Ok(ctx
            .result(definition.steps.len() - 1)
            .map(StepValue::to_json)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Resolve the step input, dispatch to the category's failover
    /// executor, and finalize the result (draining text/vision streams).
    async fn run_step(
        &self,
        step: &StepDefinition,
        index: usize,
        ctx: &WorkflowContext,
    ) -> Result<(String, StepValue), WorkflowError> {
        let input = match &step.input {
            StepInput::Literal(value) => value.clone(),
            StepInput::Transform(transformer) => {
                transformer(&ctx.input, ctx).map_err(|e| e.at_step(index))?
            }
        };

        let executor =
            FailoverExecutor::from_registry(&self.registry, step.category, self.retry.clone());
        let execution = executor
            .execute(&input)
            .await
            .map_err(|e| WorkflowError::from_provider(e, index))?;

        let service = execution.service;
        let value = match execution.output {
            CategoryOutput::Stream(stream) => {
                let text = transform::stream_to_string(stream)
                    .await
                    .map_err(|e| WorkflowError::from_provider(classify(&service, e), index))?;
                StepValue::Text(text)
            }
            CategoryOutput::Image(result) => StepValue::Image(result),
            CategoryOutput::Video(result) => StepValue::Video(result),
            CategoryOutput::Audio(result) => StepValue::Audio(result),
            CategoryOutput::Embedding(result) => StepValue::Embedding(result),
        };

        Ok((service, value))
    }

    /// Persist and announce a step failure, returning the error that fails
    /// the workflow.
    async fn settle_step_failure(
        &self,
        id: &str,
        index: usize,
        step_name: &str,
        error: WorkflowError,
    ) -> WorkflowError {
        let persisted = error.clone();
        let _ = self
            .state
            .update(id, Box::new(move |s| s.fail_step(index, persisted)))
            .await;
        self.state
            .emit(WorkflowEvent::step_failed(id, index, step_name, &error));
        error
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sched = self.scheduler.lock();
        f.debug_struct("WorkflowExecutor")
            .field("max_concurrent", &self.config.max_concurrent)
            .field("running", &sched.running.len())
            .field("queued", &sched.queue.len())
            .finish()
    }
}
