//! Integration tests for the resilient invocation wrapper.
//!
//! Time is paused so backoff sleeps are observed, not waited.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vk_core::model::{
    Classification, ModelCapabilities, ModelError, ResilientModel, RetryPolicy, ScriptedModel,
    ScriptedReply, StreamEvent, ToolSpec,
};
use vk_protocol::message_models::{Message, Role};

fn rate_limited(message: &str) -> ScriptedReply {
    ScriptedReply::Fail(ModelError::RateLimited {
        message: message.to_string(),
    })
}

fn wrap(model: &ScriptedModel) -> ResilientModel {
    ResilientModel::new(Arc::new(model.clone()), RetryPolicy::default())
}

fn conversation() -> Vec<Message> {
    vec![
        Message::system("You are an expert Grammo programmer."),
        Message::user("write fact"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_suggested_delay_is_honoured() {
    let model = ScriptedModel::new([
        rate_limited("Quota exceeded. Please retry in 5.2s."),
        ScriptedReply::text("ok"),
    ]);
    let resilient = wrap(&model);

    let start = Instant::now();
    let response = resilient
        .invoke(&conversation(), &[])
        .await
        .expect("second attempt succeeds");
    let elapsed = start.elapsed();

    assert_eq!(response.content.normalize(), "ok");
    assert!(
        elapsed >= Duration::from_millis(6200) && elapsed < Duration::from_millis(6300),
        "expected ~6.2s, slept {elapsed:?}"
    );
    assert_eq!(model.calls().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_without_hint() {
    let model = ScriptedModel::new([
        ScriptedReply::Fail(ModelError::ApiError("status RESOURCE_EXHAUSTED".to_string())),
        ScriptedReply::Fail(ModelError::ApiError("HTTP 429".to_string())),
        ScriptedReply::text("ok"),
    ]);
    let resilient = wrap(&model);

    let start = Instant::now();
    resilient
        .invoke(&conversation(), &[])
        .await
        .expect("third attempt succeeds");

    // 2s then 4s.
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(6) && elapsed < Duration::from_millis(6100),
        "expected ~6s, slept {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let model = ScriptedModel::new((0..13).map(|_| rate_limited("slow down")));
    let resilient = wrap(&model);

    let result = resilient.invoke(&conversation(), &[]).await;

    match result {
        Err(Classification::Transient { attempts, source }) => {
            assert_eq!(attempts, 12);
            assert!(matches!(source, ModelError::RateLimited { .. }));
        }
        other => panic!("expected a transient classification, got {other:?}"),
    }
    assert_eq!(model.calls().await.len(), 12);
    assert_eq!(model.remaining().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_chained_rate_limit_is_retried() {
    let chained = ModelError::RateLimited {
        message: "retry in 1s".to_string(),
    }
    .wrap("provider call failed");
    let model = ScriptedModel::new([ScriptedReply::Fail(chained), ScriptedReply::text("ok")]);

    let response = wrap(&model)
        .invoke(&conversation(), &[])
        .await
        .expect("retried");
    assert_eq!(response.content.normalize(), "ok");
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let model = ScriptedModel::new([
        ScriptedReply::Fail(ModelError::Transport("connection refused".to_string())),
        ScriptedReply::text("never reached"),
    ]);

    let result = wrap(&model).invoke(&conversation(), &[]).await;

    assert!(matches!(result, Err(Classification::Fatal(ModelError::Transport(_)))));
    assert_eq!(model.calls().await.len(), 1);
}

#[tokio::test]
async fn test_system_role_merged_for_models_without_it() {
    let model = ScriptedModel::new([ScriptedReply::text("ok")]).with_capabilities(
        ModelCapabilities {
            system_role: false,
            tool_calls: true,
        },
    );

    wrap(&model)
        .invoke(&conversation(), &[])
        .await
        .expect("invoke");

    let calls = model.calls().await;
    let sent = &calls[0].messages;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].role, Role::User);
    assert!(sent[0].text().contains("expert Grammo programmer"));
    assert!(sent[0].text().ends_with("write fact"));
}

#[tokio::test]
async fn test_tool_calls_emulated_for_models_without_native_support() {
    let reply = "Let me compile it.\n```json\n{\"action\": \"compile\", \"args\": {\"code\": \"func void -> main() {}\"}}\n```";
    let model = ScriptedModel::new([ScriptedReply::text(reply)]).with_capabilities(
        ModelCapabilities {
            system_role: true,
            tool_calls: false,
        },
    );
    let tools = [ToolSpec {
        name: "compile".to_string(),
        description: "Compile the program.".to_string(),
        parameters: serde_json::json!({"type": "object"}),
    }];

    let response = wrap(&model)
        .invoke(&conversation(), &tools)
        .await
        .expect("invoke");

    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "compile");

    let calls = model.calls().await;
    assert!(calls[0].tools.is_empty(), "tools must not be bound natively");
    let last = calls[0].messages.last().expect("directive appended");
    assert!(last.text().contains("\"action\""));
}

#[tokio::test(start_paused = true)]
async fn test_stream_restarts_from_scratch() {
    let model = ScriptedModel::new([
        ScriptedReply::FailMidStream {
            chunks: vec!["func int -> ".to_string(), "fa".to_string()],
            error: ModelError::RateLimited {
                message: "retry in 1s".to_string(),
            },
        },
        ScriptedReply::text("func int -> fact(int: n) { return 1; }"),
    ]);

    let mut seen = Vec::new();
    let text = wrap(&model)
        .stream_text(&conversation(), |event| seen.push(event.clone()))
        .await
        .expect("stream completes");

    assert_eq!(text, "func int -> fact(int: n) { return 1; }");
    assert!(seen.contains(&StreamEvent::Restarted { attempt: 1 }));
    assert_eq!(model.calls().await.len(), 2);
}
