// Document source connectors
// Each connector turns rows of an external table into `Document`s

#[cfg(test)]
mod tests;

pub mod postgres;
pub mod supabase;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AutoRagError;
use crate::config::DatabaseConfig;

pub use postgres::PostgresConnector;
pub use supabase::SupabaseConnector;

/// A single document fetched from a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short human readable name of the backend
    fn name(&self) -> &'static str;

    /// Fails when the source cannot be reached or the table cannot be read
    async fn test_connection(&self) -> Result<()>;

    async fn count_documents(&self) -> Result<u64>;

    async fn fetch_documents(&self, limit: u32) -> Result<Vec<Document>>;
}

/// Build the connector matching the configured database type
#[inline]
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn DocumentSource>, AutoRagError> {
    match config {
        DatabaseConfig::Supabase(supabase) => Ok(Box::new(SupabaseConnector::new(supabase)?)),
        DatabaseConfig::Postgresql(postgres) => {
            Ok(Box::new(PostgresConnector::connect(postgres).await?))
        }
        DatabaseConfig::Mongodb(_) => Err(AutoRagError::Config(
            "Database type 'mongodb' not yet supported. Supported types: supabase, postgresql"
                .to_string(),
        )),
    }
}

/// Convert a JSON row into a document, skipping rows without an id or text.
/// All remaining columns become metadata.
#[inline]
pub fn row_to_document(
    row: Map<String, Value>,
    id_column: &str,
    text_column: &str,
) -> Option<Document> {
    let id = row.get(id_column).and_then(value_to_string)?;
    let text = row.get(text_column).and_then(value_to_string)?;

    let metadata = row
        .into_iter()
        .filter(|(k, _)| k != id_column && k != text_column)
        .collect();

    Some(Document { id, text, metadata })
}

/// Stringify a cell. Null, false, zero and empty strings, arrays or objects count as missing
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Map rows into documents and log how many were skipped
#[inline]
pub fn rows_to_documents(
    rows: Vec<Map<String, Value>>,
    id_column: &str,
    text_column: &str,
) -> Vec<Document> {
    let total = rows.len();
    let documents: Vec<Document> = rows
        .into_iter()
        .filter_map(|row| row_to_document(row, id_column, text_column))
        .collect();

    if documents.len() < total {
        tracing::debug!(
            "Skipped {} rows missing '{}' or '{}'",
            total - documents.len(),
            id_column,
            text_column
        );
    }

    documents
}
