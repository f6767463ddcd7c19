use super::*;

fn config() -> PostgresConfig {
    PostgresConfig {
        host: Some("db.internal".to_string()),
        database: Some("corpus".to_string()),
        user: Some("reader".to_string()),
        ..PostgresConfig::default()
    }
}

#[test]
fn queries_use_configured_table() {
    assert_eq!(
        select_query("public.articles"),
        "SELECT row_to_json(t)::text FROM (SELECT * FROM public.articles LIMIT $1) t"
    );
    assert_eq!(count_query("documents"), "SELECT COUNT(*) FROM documents");
}

#[test]
fn connect_options_require_host() {
    assert!(connect_options(&config()).is_ok());

    let missing = PostgresConfig {
        host: None,
        ..config()
    };
    assert!(connect_options(&missing).is_err());
}

#[test]
fn connect_options_reject_injected_identifiers() {
    let injected = PostgresConfig {
        text_column: "content FROM secrets --".to_string(),
        ..config()
    };
    assert!(connect_options(&injected).is_err());
}

#[tokio::test]
async fn lazy_pool_does_not_touch_the_network() {
    let connector = PostgresConnector::connect(&config())
        .await
        .expect("lazy connect should succeed");
    assert_eq!(connector.name(), "postgresql");
    assert_eq!(connector.table, "documents");
}
