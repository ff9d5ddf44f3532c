//! End-to-end workflow execution against an instrumented registry with
//! deterministic providers: happy paths, failover, fatal stops, queueing
//! under capacity, chained steps, skips, and timeout composition.

mod common;

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use common::{image_provider, stack, text_provider, wait_terminal, ScriptedChat, ScriptedImage};
use prism_api::domain::{StepState, WorkflowState};
use prism_api::state::StateStore;
use prism_api::events::EventKind;
use prism_api::providers::ErrorCode;
use prism_api::workflow::{transform, WorkflowDefinition};

fn chat_definition(name: &str) -> WorkflowDefinition {
    WorkflowDefinition::builder(name)
        .text_step("complete", transform::input_to_chat_messages())
        .build()
        .unwrap()
}

/// Collect every event kind for a workflow until its channel closes.
async fn collect_kinds(
    state: &std::sync::Arc<prism_api::state::MemoryStateStore>,
    id: &str,
) -> Vec<EventKind> {
    let mut rx = state.subscribe(id);
    let mut kinds = Vec::new();
    let collector = async {
        loop {
            match rx.recv().await {
                Ok(event) => kinds.push(event.kind),
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .expect("event stream did not close in time");
    kinds
}

#[tokio::test]
async fn single_step_happy_path() {
    let provider = ScriptedChat::succeeding(vec!["hel", "lo"]);
    let harness = stack(5, vec![text_provider("A", provider.clone())]);

    let id = harness
        .executor
        .submit(chat_definition("chat").into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.id, id);
    assert_eq!(status.status, WorkflowState::Completed);
    assert_eq!(status.result, Some(serde_json::json!("hello")));
    assert_eq!(status.total_steps, 1);
    assert_eq!(status.current_step, 0);

    let step = &status.steps[0];
    assert_eq!(step.status, StepState::Completed);
    assert_eq!(step.service.as_deref(), Some("A"));
    assert_eq!(step.result, Some(serde_json::json!("hello")));
    assert!(step.started_at.unwrap() <= step.completed_at.unwrap());
    assert!(step.duration_ms.is_some());
    assert!(status.completed_at.is_some());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn submit_roundtrip_reports_matching_record() {
    let harness = stack(
        5,
        vec![text_provider("A", ScriptedChat::succeeding(vec!["x"]))],
    );
    let definition = WorkflowDefinition::builder("two-step")
        .text_step("one", transform::input_to_chat_messages())
        .text_step("two", transform::input_to_chat_messages())
        .build()
        .unwrap();

    let id = harness
        .executor
        .submit(definition.into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let record = harness.state.get(&id).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.total_steps, 2);
    wait_terminal(&harness.state, &id).await;
}

#[tokio::test]
async fn failover_on_rate_limit_completes_from_second_provider() {
    let a = ScriptedChat::failing("rate limit exceeded");
    let b = ScriptedChat::succeeding(vec!["from-b"]);
    let harness = stack(
        5,
        vec![text_provider("A", a.clone()), text_provider("B", b.clone())],
    );

    let id = harness
        .executor
        .submit(chat_definition("chat").into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.status, WorkflowState::Completed);
    assert_eq!(status.result, Some(serde_json::json!("from-b")));
    assert_eq!(status.steps[0].service.as_deref(), Some("B"));
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn auth_failure_fails_workflow_without_fallback() {
    let a = ScriptedChat::failing("Invalid API key");
    let b = ScriptedChat::succeeding(vec!["unused"]);
    let harness = stack(
        5,
        vec![text_provider("A", a.clone()), text_provider("B", b.clone())],
    );

    let id = harness
        .executor
        .submit(chat_definition("chat").into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.status, WorkflowState::Failed);

    let error = status.error.unwrap();
    assert_eq!(error.code, Some(ErrorCode::AuthFailed));
    assert_eq!(error.step, Some(0));
    assert_eq!(error.service.as_deref(), Some("A"));

    let step = &status.steps[0];
    assert_eq!(step.status, StepState::Failed);
    assert_eq!(step.error.as_ref().unwrap().code, Some(ErrorCode::AuthFailed));
    assert_eq!(b.call_count(), 0);
}

#[tokio::test]
async fn queueing_under_capacity_one() {
    let provider = ScriptedChat::slow(Duration::from_millis(150), vec!["done"]);
    let harness = stack(1, vec![text_provider("A", provider.clone())]);
    let definition = std::sync::Arc::new(chat_definition("chat"));

    let first = harness
        .executor
        .submit(definition.clone(), serde_json::json!("one"))
        .await
        .unwrap();
    let second = harness
        .executor
        .submit(definition, serde_json::json!("two"))
        .await
        .unwrap();

    // The second submission waits behind the single slot.
    let queued = harness.state.get(&second).await.unwrap().unwrap();
    assert_eq!(queued.status, WorkflowState::Queued);
    assert_eq!(harness.executor.queue_len(), 1);
    assert!(harness.executor.running_count() <= 1);

    // Collect the second workflow's full event sequence while it drains.
    let kinds = collect_kinds(&harness.state, &second).await;
    assert_eq!(
        kinds,
        vec![
            EventKind::WorkflowStarted,
            EventKind::StepStarted,
            EventKind::StepComplete,
            EventKind::WorkflowComplete,
        ]
    );

    let first_status = wait_terminal(&harness.state, &first).await;
    let second_status = wait_terminal(&harness.state, &second).await;
    assert_eq!(first_status.status, WorkflowState::Completed);
    assert_eq!(second_status.status, WorkflowState::Completed);

    // Never two drivers against the single provider at once.
    assert_eq!(provider.peak_concurrency(), 1);
    assert_eq!(harness.executor.running_count(), 0);
    assert_eq!(harness.executor.queue_len(), 0);
}

#[tokio::test]
async fn chained_text_to_image_threads_previous_result() {
    let text = ScriptedChat::succeeding(vec!["a red", " cube"]);
    let image = ScriptedImage::succeeding(vec!["u"]);
    let harness = stack(
        5,
        vec![
            text_provider("T", text.clone()),
            image_provider("I", image.clone()),
        ],
    );

    let definition = WorkflowDefinition::builder("illustrate")
        .text_step("write", transform::input_to_chat_messages())
        .image_step("draw", transform::previous_text_to_image_input())
        .build()
        .unwrap();

    let id = harness
        .executor
        .submit(definition.into(), serde_json::json!("describe a cube"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.status, WorkflowState::Completed);
    assert_eq!(status.result, Some(serde_json::json!({ "urls": ["u"] })));
    assert_eq!(image.prompt().as_deref(), Some("a red cube"));

    assert_eq!(status.steps[0].status, StepState::Completed);
    assert_eq!(status.steps[0].service.as_deref(), Some("T"));
    assert_eq!(status.steps[1].status, StepState::Completed);
    assert_eq!(status.steps[1].service.as_deref(), Some("I"));
}

#[tokio::test]
async fn total_timeout_fails_workflow_with_timeout_code() {
    let provider = ScriptedChat::slow(Duration::from_secs(10), vec!["never"]);
    let harness = stack(5, vec![text_provider("A", provider)]);

    let definition = WorkflowDefinition::builder("slow")
        .total_timeout(Duration::from_millis(300))
        .text_step("complete", transform::input_to_chat_messages())
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    let id = harness
        .executor
        .submit(definition.into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    let elapsed = started.elapsed();

    assert_eq!(status.status, WorkflowState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.code, Some(ErrorCode::Timeout));
    assert_eq!(error.step, Some(0));

    // The step was running when the alarm fired, then settled failed.
    let step = &status.steps[0];
    assert_eq!(step.status, StepState::Failed);
    assert!(step.started_at.is_some());

    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(3), "fired long after the budget");
}

#[tokio::test]
async fn per_step_timeout_applies_before_total() {
    let provider = ScriptedChat::slow(Duration::from_secs(10), vec!["never"]);
    let harness = stack(5, vec![text_provider("A", provider)]);

    let definition = WorkflowDefinition::builder("slow-step")
        .default_step_timeout(Duration::from_millis(200))
        .text_step("complete", transform::input_to_chat_messages())
        .build()
        .unwrap();

    let id = harness
        .executor
        .submit(definition.into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.status, WorkflowState::Failed);
    assert_eq!(status.error.unwrap().code, Some(ErrorCode::Timeout));
}

#[tokio::test]
async fn skipped_step_emits_event_and_yields_null_result() {
    // First invocation (the blocker's step) is slow so the slot stays
    // occupied until the subscription below is in place; later invocations
    // are instant.
    let provider = ScriptedChat::new(
        vec![common::ChatOutcome::Delay(
            Duration::from_millis(200),
            vec!["text"],
        )],
        common::ChatOutcome::Chunks(vec!["text"]),
    );
    let harness = stack(1, vec![text_provider("A", provider.clone())]);

    // Occupy the single slot so the subscription below catches the whole
    // second workflow's sequence.
    let blocker = harness
        .executor
        .submit(
            std::sync::Arc::new(chat_definition("blocker")),
            serde_json::json!("hi"),
        )
        .await
        .unwrap();

    let definition = WorkflowDefinition::builder("with-skip")
        .text_step("write", transform::input_to_chat_messages())
        .step(
            prism_api::workflow::StepDefinition::new(
                "maybe",
                prism_api::providers::Category::Text,
                transform::input_to_chat_messages(),
            )
            .with_skip_if(|_| true),
        )
        .build()
        .unwrap();

    let id = harness
        .executor
        .submit(definition.into(), serde_json::json!("hi"))
        .await
        .unwrap();

    let kinds = collect_kinds(&harness.state, &id).await;
    assert_eq!(
        kinds,
        vec![
            EventKind::WorkflowStarted,
            EventKind::StepStarted,
            EventKind::StepComplete,
            EventKind::StepSkipped,
            EventKind::WorkflowComplete,
        ]
    );

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.status, WorkflowState::Completed);
    assert_eq!(status.steps[1].status, StepState::Skipped);
    // The last step produced nothing, so the workflow result is null.
    assert_eq!(status.result, Some(serde_json::Value::Null));

    wait_terminal(&harness.state, &blocker).await;
}

#[tokio::test]
async fn missing_category_fails_workflow_with_service_error() {
    let harness = stack(
        5,
        vec![text_provider("A", ScriptedChat::succeeding(vec!["x"]))],
    );

    let definition = WorkflowDefinition::builder("needs-images")
        .image_step("draw", transform::input_to_image_input())
        .build()
        .unwrap();

    let id = harness
        .executor
        .submit(definition.into(), serde_json::json!("a cube"))
        .await
        .unwrap();

    let status = wait_terminal(&harness.state, &id).await;
    assert_eq!(status.status, WorkflowState::Failed);
    assert_eq!(status.error.unwrap().code, Some(ErrorCode::ServiceError));
}

#[tokio::test]
async fn concurrency_bound_holds_across_many_submissions() {
    let provider = ScriptedChat::slow(Duration::from_millis(50), vec!["ok"]);
    let harness = stack(2, vec![text_provider("A", provider.clone())]);
    let definition = std::sync::Arc::new(chat_definition("chat"));

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(
            harness
                .executor
                .submit(definition.clone(), serde_json::json!(format!("job {i}")))
                .await
                .unwrap(),
        );
    }

    for id in &ids {
        let status = wait_terminal(&harness.state, id).await;
        assert_eq!(status.status, WorkflowState::Completed);
    }

    assert!(provider.peak_concurrency() <= 2);
    assert_eq!(harness.executor.queue_len(), 0);
    assert_eq!(harness.executor.running_count(), 0);
}
