use super::*;

#[test]
fn endpoint_joins_base_url() {
    let config = LlmConfig {
        base_url: "https://api.groq.com/openai/v1/".to_string(),
        ..LlmConfig::default()
    };
    let client = GroqClient::new("gsk_test", &config).expect("should build client");

    assert_eq!(
        client.endpoint,
        "https://api.groq.com/openai/v1/chat/completions"
    );
    assert_eq!(client.model(), "llama-3.3-70b-versatile");
}

#[test]
fn blank_key_is_rejected() {
    assert!(GroqClient::new("  ", &LlmConfig::default()).is_err());
}

#[test]
fn parses_content_and_usage() {
    let body = r#"{
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "Rust is a language."}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
    }"#;

    let completion = parse_completion(body).expect("should parse");
    assert_eq!(completion.content, "Rust is a language.");
    assert_eq!(
        completion.usage,
        Some(TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 8,
            total_tokens: 128
        })
    );
}

#[test]
fn missing_usage_is_allowed() {
    let body = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
    let completion = parse_completion(body).expect("should parse");
    assert_eq!(completion.usage, None);
}

#[test]
fn empty_choices_is_an_error() {
    assert!(parse_completion(r#"{"choices": []}"#).is_err());
    assert!(parse_completion("not json").is_err());
}

#[test]
fn request_serializes_openai_shape() {
    let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
    let request = ChatRequest {
        model: "m",
        messages: &messages,
        temperature: 0.0,
        max_tokens: 10,
    };

    let value = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(value["messages"][0]["role"], "system");
    assert_eq!(value["messages"][1]["content"], "hi");
    assert_eq!(value["max_tokens"], 10);
}
