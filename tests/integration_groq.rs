#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Chat completions against a mocked OpenAI-compatible endpoint

use autorag::config::LlmConfig;
use autorag::llm::{ChatMessage, ChatModel, CompletionOptions, GroqClient, TokenUsage};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, retry_attempts: u32) -> GroqClient {
    let config = LlmConfig {
        base_url: format!("{}/openai/v1", server.uri()),
        model: "llama-3.1-8b-instant".to_string(),
        ..LlmConfig::default()
    };
    GroqClient::new("gsk-test", &config)
        .expect("should build client")
        .with_retry_attempts(retry_attempts)
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Answer briefly."),
        ChatMessage::user("What is Rust?"),
    ]
}

fn options() -> CompletionOptions {
    CompletionOptions {
        temperature: 0.2,
        max_tokens: 64,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_returns_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("Authorization", "Bearer gsk-test"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "max_tokens": 64,
            "messages": [
                {"role": "system", "content": "Answer briefly."},
                {"role": "user", "content": "What is Rust?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "A systems language."}}],
            "usage": {"prompt_tokens": 21, "completion_tokens": 5, "total_tokens": 26}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client(&server, 1)
        .complete(&messages(), &options())
        .expect("completion should succeed");

    assert_eq!(completion.content, "A systems language.");
    assert_eq!(
        completion.usage,
        Some(TokenUsage {
            prompt_tokens: 21,
            completion_tokens: 5,
            total_tokens: 26,
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_usage_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .mount(&server)
        .await;

    let completion = client(&server, 1)
        .complete(&messages(), &options())
        .expect("completion should succeed");
    assert_eq!(completion.content, "ok");
    assert!(completion.usage.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .complete(&messages(), &options())
        .expect_err("bad key should surface");
    assert!(format!("{err:#}").contains("401"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_is_retried_after_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "after the wait"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client(&server, 3)
        .complete(&messages(), &options())
        .expect("429 should be retried");
    assert_eq!(completion.content, "after the wait");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server, 2)
        .complete(&messages(), &options())
        .expect_err("exhausted retries should fail");
    assert!(format!("{err:#}").contains("All 2 attempts"));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_choices_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client(&server, 1)
        .complete(&messages(), &options())
        .expect_err("no choices should fail");
    assert!(err.to_string().contains("no message"));
}
