#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info};

use super::{Document, DocumentSource, rows_to_documents};
use crate::AutoRagError;
use crate::config::{PostgresConfig, validate_identifier};

/// Reads documents from a PostgreSQL table
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    pool: PgPool,
    table: String,
    text_column: String,
    id_column: String,
}

impl PostgresConnector {
    #[inline]
    pub async fn connect(config: &PostgresConfig) -> Result<Self, AutoRagError> {
        let options = connect_options(config)?;

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy_with(options);

        debug!(
            "Configured PostgreSQL pool for {}:{}",
            config.host.as_deref().unwrap_or_default(),
            config.port
        );

        Ok(Self {
            pool,
            table: config.table.clone(),
            text_column: config.text_column.clone(),
            id_column: config.id_column.clone(),
        })
    }

    async fn select_rows(&self, limit: i64) -> Result<Vec<Map<String, Value>>> {
        let query = select_query(&self.table);
        let rows: Vec<String> = sqlx::query_scalar(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to query table '{}'", self.table))?;

        rows.iter()
            .map(|row| serde_json::from_str(row).context("Row is not a JSON object"))
            .collect()
    }
}

fn connect_options(config: &PostgresConfig) -> Result<PgConnectOptions, AutoRagError> {
    let host = config
        .host
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| AutoRagError::Config("PostgreSQL host is required".to_string()))?;

    for identifier in [&config.table, &config.text_column, &config.id_column] {
        validate_identifier(identifier).map_err(|e| AutoRagError::Config(e.to_string()))?;
    }

    let mut options = PgConnectOptions::new().host(host).port(config.port);
    if let Some(database) = config.database.as_deref() {
        options = options.database(database);
    }
    if let Some(user) = config.user.as_deref() {
        options = options.username(user);
    }
    if let Some(password) = config.password.as_deref() {
        options = options.password(password);
    }

    Ok(options)
}

/// Rows are serialized by the server so every column type maps onto JSON
fn select_query(table: &str) -> String {
    format!("SELECT row_to_json(t)::text FROM (SELECT * FROM {table} LIMIT $1) t")
}

fn count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

#[async_trait]
impl DocumentSource for PostgresConnector {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    async fn test_connection(&self) -> Result<()> {
        self.select_rows(1)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(())
    }

    async fn count_documents(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&count_query(&self.table))
            .fetch_one(&self.pool)
            .await
            .context("Failed to count documents")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_documents(&self, limit: u32) -> Result<Vec<Document>> {
        let rows = self
            .select_rows(i64::from(limit))
            .await
            .context("Failed to fetch documents from PostgreSQL")?;

        let documents = rows_to_documents(rows, &self.id_column, &self.text_column);
        info!(
            "Fetched {} documents from PostgreSQL table {}",
            documents.len(),
            self.table
        );
        Ok(documents)
    }
}
