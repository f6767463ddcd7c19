// Vector index backends
// Pinecone over its REST API, or LanceDB stored under the data directory


pub mod lancedb;
pub mod pinecone;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::AutoRagError;
use crate::config::{Config, VectorBackend};

pub use self::lancedb::LanceIndex;
pub use self::pinecone::PineconeIndex;

/// Metadata key holding the source document id
pub const DOCUMENT_ID_KEY: &str = "document_id";
/// Metadata key holding the (truncated) chunk text
pub const TEXT_KEY: &str = "text";

/// One embedded chunk ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub document_id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub id: String,
    pub document_id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Where vectors live: a namespace inside an index of a given dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexTarget {
    pub namespace: String,
    pub dimension: usize,
}

impl IndexTarget {
    #[inline]
    pub fn new(namespace: impl Into<String>, dimension: usize) -> Self {
        Self {
            namespace: namespace.into(),
            dimension,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub total_vector_count: u64,
    pub namespaces: BTreeMap<String, u64>,
}

impl IndexStats {
    /// Vector count of a single namespace, zero when absent
    #[inline]
    pub fn namespace_count(&self, namespace: &str) -> u64 {
        self.namespaces.get(namespace).copied().unwrap_or(0)
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Store records, replacing any with the same id. Returns the number written.
    async fn upsert(&self, target: &IndexTarget, records: &[VectorRecord]) -> Result<usize>;

    async fn query(
        &self,
        target: &IndexTarget,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>>;

    /// Remove every vector in the target namespace
    async fn clear(&self, target: &IndexTarget) -> Result<()>;

    async fn stats(&self, target: &IndexTarget) -> Result<IndexStats>;
}

/// Open the backend selected in `[vector_store]`
#[inline]
pub async fn open(config: &Config) -> Result<Box<dyn VectorIndex>, AutoRagError> {
    match config.vector_store.backend {
        VectorBackend::Pinecone => Ok(Box::new(PineconeIndex::new(
            &config.api_keys,
            &config.vector_store,
            config.embedding.dimension as usize,
        )?)),
        VectorBackend::Lancedb => {
            let path = config
                .vector_database_path()
                .map_err(|e| AutoRagError::Config(e.to_string()))?;
            Ok(Box::new(
                LanceIndex::open(&path, config.vector_store.metadata_text_limit).await?,
            ))
        }
    }
}

/// Longest prefix of `text` with at most `limit` characters
#[inline]
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    text.char_indices()
        .nth(limit)
        .and_then(|(idx, _)| text.get(..idx))
        .unwrap_or(text)
}

/// Keep only metadata values a flat key-value store accepts:
/// strings, numbers, booleans and lists of strings
#[inline]
pub fn flatten_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    metadata
        .iter()
        .filter(|(_, value)| match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
            Value::Array(items) => items.iter().all(Value::is_string),
            Value::Null | Value::Object(_) => false,
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
