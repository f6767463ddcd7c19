#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama embedding client against a mocked server

use autorag::config::EmbeddingConfig;
use autorag::embeddings::{Embedder, EmbedderFactory, OllamaClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, batch_size: u32) -> OllamaClient {
    let address = server.address();
    let config = EmbeddingConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "nomic-embed-text:latest".to_string(),
        batch_size,
        retry_attempts: 1,
        ..EmbeddingConfig::default()
    };
    OllamaClient::new(&config).expect("should build client")
}

async fn mount_tags(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "nomic-embed-text:latest", "size": 274302450, "digest": "0a109f422b47"},
                {"name": "all-minilm:latest"}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_finds_configured_model() {
    let server = MockServer::start().await;
    mount_tags(&server).await;

    let client = client(&server, 8);
    client.health_check().expect("health check should pass");

    let models = client.list_models().expect("should list models");
    assert_eq!(models.len(), 2);
    assert_eq!(models[1].size, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_fails_validation() {
    let server = MockServer::start().await;
    mount_tags(&server).await;

    let err = client(&server, 8)
        .with_model("mxbai-embed-large")
        .validate_model()
        .expect_err("unknown model should fail");
    assert!(err.to_string().contains("ollama pull mxbai-embed-large"));
}

#[tokio::test(flavor = "multi_thread")]
async fn embeddings_are_requested_in_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text:latest", "input": ["one", "two"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["three"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .expect(1)
        .mount(&server)
        .await;

    let texts: Vec<String> = ["one", "two", "three"].iter().map(|s| (*s).to_string()).collect();
    let vectors = client(&server, 2).embed(&texts).expect("should embed");

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let texts = vec!["a".to_string(), "b".to_string()];
    let err = client(&server, 8).embed(&texts).expect_err("should fail");
    assert!(format!("{err:#}").contains("Mismatch between request and response counts"));
}

#[tokio::test(flavor = "multi_thread")]
async fn factory_embedders_use_their_own_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "all-minilm:latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.25, 0.75]]})))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = client(&server, 8)
        .embedder_for("all-minilm:latest")
        .expect("factory should hand out an embedder");
    assert_eq!(embedder.model(), "all-minilm:latest");

    let vectors = embedder
        .embed(&["hello".to_string()])
        .expect("should embed");
    assert_eq!(vectors, vec![vec![0.25, 0.75]]);
}
