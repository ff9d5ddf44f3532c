//! Failover executor behavior against deterministic providers: rotation,
//! retry accounting, fatal short-circuits, and exhaustion synthesis.

mod common;

use common::{fast_retry, text_provider, ChatOutcome, ScriptedChat};
use prism_api::providers::{
    Category, CategoryInput, CategoryOutput, ChatMessage, ErrorCode, FailoverExecutor,
};
use prism_api::workflow::transform::stream_to_string;

fn chat_input(text: &str) -> CategoryInput {
    CategoryInput::Chat(vec![ChatMessage::user(text)])
}

async fn drain(output: CategoryOutput) -> String {
    match output {
        CategoryOutput::Stream(stream) => stream_to_string(stream).await.unwrap(),
        other => panic!("expected a stream, got {:?}", std::mem::discriminant(&other)),
    }
}

#[tokio::test]
async fn empty_provider_list_fails_without_attempts() {
    let executor = FailoverExecutor::new(Category::Text, Vec::new(), fast_retry());
    let err = executor.execute(&chat_input("hi")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ServiceError);
    assert!(err.message.contains("text"));
}

#[tokio::test]
async fn single_provider_happy_path() {
    let a = ScriptedChat::succeeding(vec!["hel", "lo"]);
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone())],
        fast_retry(),
    );

    let execution = executor.execute(&chat_input("hi")).await.unwrap();
    assert_eq!(execution.service, "A");
    assert_eq!(drain(execution.output).await, "hello");
    assert_eq!(a.call_count(), 1);
}

#[tokio::test]
async fn rate_limited_provider_fails_over_to_next() {
    let a = ScriptedChat::failing("rate limit exceeded");
    let b = ScriptedChat::succeeding(vec!["from-b"]);
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone()), text_provider("B", b.clone())],
        fast_retry(),
    );

    let execution = executor.execute(&chat_input("hi")).await.unwrap();
    assert_eq!(execution.service, "B");
    assert_eq!(drain(execution.output).await, "from-b");
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn auth_failure_is_fatal_and_skips_fallback() {
    let a = ScriptedChat::failing("Invalid API key");
    let b = ScriptedChat::succeeding(vec!["unused"]);
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone()), text_provider("B", b.clone())],
        fast_retry(),
    );

    let err = executor.execute(&chat_input("hi")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthFailed);
    assert_eq!(err.service, "A");
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 0, "fatal errors must not fall over");
}

#[tokio::test]
async fn invalid_request_is_fatal() {
    let a = ScriptedChat::failing("invalid payload shape");
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone())],
        fast_retry(),
    );

    let err = executor.execute(&chat_input("hi")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
    assert_eq!(a.call_count(), 1);
}

#[tokio::test]
async fn rotation_never_repeats_while_untried_providers_remain() {
    let a = ScriptedChat::failing("timeout while connecting");
    let b = ScriptedChat::failing("rate limited");
    let c = ScriptedChat::succeeding(vec!["from-c"]);
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![
            text_provider("A", a.clone()),
            text_provider("B", b.clone()),
            text_provider("C", c.clone()),
        ],
        fast_retry(),
    );

    let execution = executor.execute(&chat_input("hi")).await.unwrap();
    assert_eq!(execution.service, "C");
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
    assert_eq!(c.call_count(), 1);
}

#[tokio::test]
async fn exhaustion_synthesizes_service_error_with_attempted_list() {
    let a = ScriptedChat::failing("rate limited");
    let b = ScriptedChat::failing("request timed out");
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone()), text_provider("B", b.clone())],
        fast_retry(),
    );

    let err = executor.execute(&chat_input("hi")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ServiceError);
    assert_eq!(err.service, "A, B");
    assert!(err.message.contains("A, B"));
    // max_retries = 3 invocations over a two-provider rotation: the wrap
    // lands back on A once every name has been tried.
    assert_eq!(a.call_count() + b.call_count(), 3);
}

#[tokio::test]
async fn single_provider_retries_on_retryable_errors() {
    let a = ScriptedChat::new(
        vec![
            ChatOutcome::Fail("rate limited"),
            ChatOutcome::Fail("rate limited"),
        ],
        ChatOutcome::Chunks(vec!["ok"]),
    );
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone())],
        fast_retry(),
    );

    let execution = executor.execute(&chat_input("hi")).await.unwrap();
    assert_eq!(execution.service, "A");
    assert_eq!(drain(execution.output).await, "ok");
    assert_eq!(a.call_count(), 3);
}

#[tokio::test]
async fn classified_code_survives_unchanged() {
    let a = ScriptedChat::failing("model not found");
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a)],
        // One invocation only: the classified code surfaces through the
        // exhaustion path's cause list untouched.
        prism_api::providers::RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
    );

    let err = executor.execute(&chat_input("hi")).await.unwrap_err();
    assert!(err.message.contains("MODEL_UNAVAILABLE"));
}

#[tokio::test]
async fn registry_backed_executors_share_rotation() {
    use prism_api::providers::ProviderRegistry;
    use std::sync::Arc;

    let registry = Arc::new(ProviderRegistry::new());
    registry.register(text_provider("A", ScriptedChat::succeeding(vec!["a"])));
    registry.register(text_provider("B", ScriptedChat::succeeding(vec!["b"])));

    // Fresh executors per call (as the workflow driver builds them) still
    // spread load through the registry's shared cursor.
    let first = FailoverExecutor::from_registry(&registry, Category::Text, fast_retry())
        .execute(&chat_input("hi"))
        .await
        .unwrap();
    let second = FailoverExecutor::from_registry(&registry, Category::Text, fast_retry())
        .execute(&chat_input("hi"))
        .await
        .unwrap();

    assert_eq!(first.service, "A");
    assert_eq!(second.service, "B");
}

#[tokio::test]
async fn successive_executions_rotate_the_cursor() {
    let a = ScriptedChat::succeeding(vec!["a"]);
    let b = ScriptedChat::succeeding(vec!["b"]);
    let executor = FailoverExecutor::new(
        Category::Text,
        vec![text_provider("A", a.clone()), text_provider("B", b.clone())],
        fast_retry(),
    );

    let first = executor.execute(&chat_input("hi")).await.unwrap();
    let second = executor.execute(&chat_input("hi")).await.unwrap();
    assert_eq!(first.service, "A");
    assert_eq!(second.service, "B");
}
