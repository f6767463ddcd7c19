
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{Document, DocumentSource, rows_to_documents};
use crate::AutoRagError;
use crate::config::SupabaseConfig;
use crate::http::{self, DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS};

/// Reads documents from a Supabase table through the PostgREST API
#[derive(Debug, Clone)]
pub struct SupabaseConnector {
    endpoint: String,
    key: String,
    table: String,
    text_column: String,
    id_column: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl SupabaseConnector {
    #[inline]
    pub fn new(config: &SupabaseConfig) -> Result<Self, AutoRagError> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AutoRagError::Config("Supabase URL is required".to_string()))?;
        let key = config
            .key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AutoRagError::Config("Supabase key is required".to_string()))?;

        let endpoint = format!("{}/rest/v1/{}", url.trim_end_matches('/'), config.table);

        Ok(Self {
            endpoint,
            key: key.to_string(),
            table: config.table.clone(),
            text_column: config.text_column.clone(),
            id_column: config.id_column.clone(),
            agent: http::build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn select_rows(&self, limit: u32) -> Result<Vec<Map<String, Value>>> {
        let limit = limit.to_string();
        let body = http::with_retry(&self.endpoint, self.retry_attempts, || {
            self.agent
                .get(&self.endpoint)
                .query("select", "*")
                .query("limit", &limit)
                .header("apikey", &self.key)
                .header("Authorization", &format!("Bearer {}", self.key))
                .call()
                .map_err(http::AttemptError::from)
                .and_then(http::read_text)
        })?;

        serde_json::from_str(&body)
            .with_context(|| format!("Unexpected response from Supabase table '{}'", self.table))
    }
}

#[async_trait]
impl DocumentSource for SupabaseConnector {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn test_connection(&self) -> Result<()> {
        debug!("Testing Supabase connection to table {}", self.table);
        self.select_rows(1)
            .context("Failed to connect to Supabase")?;
        Ok(())
    }

    async fn count_documents(&self) -> Result<u64> {
        let content_range = http::with_retry(&self.endpoint, self.retry_attempts, || {
            let resp = http::check_status(
                self.agent
                    .get(&self.endpoint)
                    .query("select", "*")
                    .header("apikey", &self.key)
                    .header("Authorization", &format!("Bearer {}", self.key))
                    .header("Prefer", "count=exact")
                    .header("Range", "0-0")
                    .call()?,
            )?;
            Ok(resp
                .headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string))
        })
        .context("Failed to count documents")?;

        Ok(content_range.as_deref().and_then(parse_total).unwrap_or(0))
    }

    async fn fetch_documents(&self, limit: u32) -> Result<Vec<Document>> {
        let rows = self
            .select_rows(limit)
            .context("Failed to fetch documents from Supabase")?;

        let documents = rows_to_documents(rows, &self.id_column, &self.text_column);
        info!(
            "Fetched {} documents from Supabase table {}",
            documents.len(),
            self.table
        );
        Ok(documents)
    }
}

/// Total row count from a PostgREST `Content-Range` header such as `0-0/42`
#[inline]
pub fn parse_total(content_range: &str) -> Option<u64> {
    content_range.rsplit_once('/')?.1.trim().parse().ok()
}
