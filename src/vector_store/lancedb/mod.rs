
use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{IndexStats, IndexTarget, RetrievalMatch, VectorIndex, VectorRecord, truncate_chars};
use crate::AutoRagError;

const DEFAULT_TABLE: &str = "documents";

/// Local vector index: one LanceDB table per namespace
pub struct LanceIndex {
    connection: Connection,
    text_limit: usize,
}

impl std::fmt::Debug for LanceIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceIndex")
            .field("text_limit", &self.text_limit)
            .finish_non_exhaustive()
    }
}

impl LanceIndex {
    #[inline]
    pub async fn open(path: &Path, text_limit: usize) -> Result<Self, AutoRagError> {
        std::fs::create_dir_all(path).map_err(|e| {
            AutoRagError::VectorStore(format!(
                "Failed to create vector database directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let uri = path.to_string_lossy().to_string();
        debug!("Opening LanceDB at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AutoRagError::VectorStore(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            text_limit,
        })
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")
    }

    async fn open_table(&self, name: &str) -> Result<Option<lancedb::Table>> {
        if !self.table_names().await?.iter().any(|t| t == name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table '{name}'"))?;
        Ok(Some(table))
    }

    /// Open the namespace table, recreating it if its vector dimension differs
    async fn table_for_write(&self, name: &str, dimension: usize) -> Result<lancedb::Table> {
        if let Some(table) = self.open_table(name).await? {
            let schema = table.schema().await.context("Failed to read table schema")?;
            if vector_dimension(&schema) == Some(dimension) {
                return Ok(table);
            }

            warn!(
                "Table '{}' has a different vector dimension, recreating with {}",
                name, dimension
            );
            self.connection
                .drop_table(name)
                .await
                .with_context(|| format!("Failed to drop table '{name}'"))?;
        }

        info!("Creating LanceDB table '{}' ({} dimensions)", name, dimension);
        self.connection
            .create_empty_table(name, create_schema(dimension))
            .execute()
            .await
            .with_context(|| format!("Failed to create table '{name}'"))
    }

    fn create_record_batch(&self, records: &[VectorRecord], dimension: usize) -> Result<RecordBatch> {
        let mut flat_values = Vec::with_capacity(records.len() * dimension);
        let mut metadata = Vec::with_capacity(records.len());

        for record in records {
            flat_values.extend_from_slice(&record.vector);
            metadata.push(
                serde_json::to_string(&record.metadata).context("Failed to serialize metadata")?,
            );
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            i32::try_from(dimension).context("Vector dimension too large")?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .context("Failed to create vector array")?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.id.as_str()),
            )),
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.document_id.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                records
                    .iter()
                    .map(|r| truncate_chars(&r.text, self.text_limit)),
            )),
            Arc::new(StringArray::from(metadata)),
        ];

        RecordBatch::try_new(create_schema(dimension), arrays)
            .context("Failed to create record batch")
    }
}

/// Namespaces map to table names; the default namespace uses a fixed table
#[inline]
pub fn table_name(namespace: &str) -> String {
    if namespace.is_empty() {
        DEFAULT_TABLE.to_string()
    } else {
        namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(dimension).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

fn vector_dimension(schema: &Schema) -> Option<usize> {
    schema.fields().iter().find_map(|field| {
        if field.name() != "vector" {
            return None;
        }
        match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        }
    })
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("Missing {name} column"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("Invalid {name} column type"))
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<RetrievalMatch>> {
    let ids = string_column(batch, "id")?;
    let document_ids = string_column(batch, "document_id")?;
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
        let metadata: Map<String, Value> =
            serde_json::from_str(metadata.value(row)).unwrap_or_default();

        matches.push(RetrievalMatch {
            id: ids.value(row).to_string(),
            document_id: document_ids.value(row).to_string(),
            score: 1.0 - distance,
            text: texts.value(row).to_string(),
            metadata,
        });
    }

    Ok(matches)
}

/// SQL string literal for a LanceDB predicate
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl VectorIndex for LanceIndex {
    fn name(&self) -> &'static str {
        "lancedb"
    }

    async fn upsert(&self, target: &IndexTarget, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != target.dimension) {
            anyhow::bail!(
                "Vector '{}' has {} dimensions, index expects {}",
                bad.id,
                bad.vector.len(),
                target.dimension
            );
        }

        let name = table_name(&target.namespace);
        let table = self.table_for_write(&name, target.dimension).await?;

        let predicate = format!(
            "id IN ({})",
            records
                .iter()
                .map(|r| quote(&r.id))
                .collect::<Vec<_>>()
                .join(", ")
        );
        table
            .delete(&predicate)
            .await
            .context("Failed to replace existing vectors")?;

        let batch = self.create_record_batch(records, target.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .context("Failed to insert vectors")?;

        info!("Stored {} vectors in LanceDB table '{}'", records.len(), name);
        Ok(records.len())
    }

    async fn query(
        &self,
        target: &IndexTarget,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let name = table_name(&target.namespace);
        let Some(table) = self.open_table(&name).await? else {
            debug!("Table '{}' does not exist, no matches", name);
            return Ok(Vec::new());
        };

        let mut stream = table
            .vector_search(vector)
            .context("Failed to create vector search")?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .context("Failed to execute search")?;

        let mut matches = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .context("Failed to read result stream")?
        {
            matches.extend(parse_batch(&batch)?);
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn clear(&self, target: &IndexTarget) -> Result<()> {
        let name = table_name(&target.namespace);
        if self.open_table(&name).await?.is_some() {
            self.connection
                .drop_table(&name)
                .await
                .with_context(|| format!("Failed to drop table '{name}'"))?;
            info!("Cleared LanceDB table '{}'", name);
        }
        Ok(())
    }

    async fn stats(&self, target: &IndexTarget) -> Result<IndexStats> {
        let mut stats = IndexStats {
            dimension: target.dimension,
            ..IndexStats::default()
        };

        for name in self.table_names().await? {
            let table = self
                .connection
                .open_table(&name)
                .execute()
                .await
                .with_context(|| format!("Failed to open table '{name}'"))?;
            let count = table
                .count_rows(None)
                .await
                .with_context(|| format!("Failed to count rows in '{name}'"))?;
            let count = u64::try_from(count).unwrap_or(u64::MAX);
            stats.total_vector_count += count;

            let namespace = if name == DEFAULT_TABLE {
                String::new()
            } else {
                name
            };
            stats.namespaces.insert(namespace, count);
        }

        Ok(stats)
    }
}
