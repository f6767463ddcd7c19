use super::*;
use crate::config::MongoConfig;
use serde_json::json;

fn row(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn row_maps_id_text_and_metadata() {
    let document = row_to_document(
        row(json!({"id": 7, "content": "Hello world", "title": "Greeting", "tags": ["a"]})),
        "id",
        "content",
    )
    .expect("row should map");

    assert_eq!(document.id, "7");
    assert_eq!(document.text, "Hello world");
    assert_eq!(document.metadata.len(), 2);
    assert_eq!(document.metadata["title"], json!("Greeting"));
    assert!(!document.metadata.contains_key("id"));
    assert!(!document.metadata.contains_key("content"));
}

#[test]
fn rows_without_id_or_text_are_skipped() {
    let rows = vec![
        row(json!({"id": "a", "content": "kept"})),
        row(json!({"id": "b", "content": ""})),
        row(json!({"id": null, "content": "no id"})),
        row(json!({"content": "missing id column"})),
        row(json!({"id": 0, "content": "falsy id"})),
        row(json!({"id": "c", "content": "also kept"})),
    ];

    let documents = rows_to_documents(rows, "id", "content");
    let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[test]
fn empty_containers_count_as_missing() {
    assert!(row_to_document(row(json!({"id": "a", "content": []})), "id", "content").is_none());
    assert!(row_to_document(row(json!({"id": "a", "content": {}})), "id", "content").is_none());
    assert!(row_to_document(row(json!({"id": [], "content": "text"})), "id", "content").is_none());

    let nested = row_to_document(
        row(json!({"id": "b", "content": {"en": "Hello"}})),
        "id",
        "content",
    )
    .expect("non-empty object should map");
    assert_eq!(nested.text, r#"{"en":"Hello"}"#);
}

#[test]
fn custom_columns_are_respected() {
    let document = row_to_document(
        row(json!({"uuid": "doc-1", "body": "Text", "id": 99})),
        "uuid",
        "body",
    )
    .expect("row should map");

    assert_eq!(document.id, "doc-1");
    assert_eq!(document.metadata["id"], json!(99));
}

#[tokio::test]
async fn mongodb_is_not_supported() {
    let config = DatabaseConfig::Mongodb(MongoConfig {
        connection_string: Some("mongodb://localhost".to_string()),
        ..MongoConfig::default()
    });

    let err = connect(&config)
        .await
        .err()
        .expect("mongodb should be rejected");
    assert!(err.to_string().contains("not yet supported"));
}
