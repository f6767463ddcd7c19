
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    DOCUMENT_ID_KEY, IndexStats, IndexTarget, RetrievalMatch, TEXT_KEY, VectorIndex, VectorRecord,
    flatten_metadata, truncate_chars,
};
use crate::AutoRagError;
use crate::config::{ApiKeysConfig, VectorStoreConfig};
use crate::http::{self, DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_SECONDS};

const API_VERSION: &str = "2024-07";
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const VISIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pinecone serverless index reached over the REST API
#[derive(Debug)]
pub struct PineconeIndex {
    api_key: String,
    controller_url: String,
    index_name: String,
    default_dimension: usize,
    cloud: String,
    region: String,
    metric: String,
    batch_size: usize,
    text_limit: usize,
    ready_timeout: Duration,
    agent: ureq::Agent,
    retry_attempts: u32,
    /// Data-plane host per index dimension
    hosts: Mutex<HashMap<usize, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub status: Option<IndexStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexStatus {
    pub ready: bool,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    delete_all: bool,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

impl PineconeIndex {
    #[inline]
    pub fn new(
        api_keys: &ApiKeysConfig,
        config: &VectorStoreConfig,
        default_dimension: usize,
    ) -> Result<Self, AutoRagError> {
        if api_keys.pinecone.trim().is_empty() {
            return Err(AutoRagError::Config(
                "Pinecone API key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            api_key: api_keys.pinecone.clone(),
            controller_url: config.controller_url.trim_end_matches('/').to_string(),
            index_name: api_keys.pinecone_index.clone(),
            default_dimension,
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            metric: config.metric.clone(),
            batch_size: config.upsert_batch_size.max(1),
            text_limit: config.metadata_text_limit,
            ready_timeout: Duration::from_secs(config.ready_timeout_seconds),
            agent: http::build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Indexes are fixed-dimension, so other dimensions get a suffixed index
    #[inline]
    pub fn index_name_for(&self, dimension: usize) -> String {
        if dimension == self.default_dimension {
            self.index_name.clone()
        } else {
            format!("{}-{}", self.index_name, dimension)
        }
    }

    fn get(&self, url: &str) -> Result<String, http::RequestError> {
        http::with_retry(url, self.retry_attempts, || {
            self.agent
                .get(url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .call()
                .map_err(http::AttemptError::from)
                .and_then(http::read_text)
        })
    }

    fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<String> {
        let json = serde_json::to_string(body).context("Failed to serialize Pinecone request")?;
        let text = http::with_retry(url, self.retry_attempts, || {
            self.agent
                .post(url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .header("Content-Type", "application/json")
                .send(&json)
                .map_err(http::AttemptError::from)
                .and_then(http::read_text)
        })?;
        Ok(text)
    }

    #[inline]
    pub fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let url = format!("{}/indexes", self.controller_url);
        let body = self.get(&url).context("Failed to list Pinecone indexes")?;
        let list: IndexList =
            serde_json::from_str(&body).context("Failed to parse Pinecone index list")?;
        Ok(list.indexes)
    }

    #[inline]
    pub fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let body = self
            .get(&url)
            .with_context(|| format!("Failed to describe Pinecone index '{name}'"))?;
        serde_json::from_str(&body).context("Failed to parse Pinecone index description")
    }

    fn create_index(&self, name: &str, dimension: usize) -> Result<()> {
        info!(
            "Creating Pinecone index {} ({} dimensions, {} in {}/{})",
            name, dimension, self.metric, self.cloud, self.region
        );

        let request = CreateIndexRequest {
            name,
            dimension,
            metric: &self.metric,
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };
        let url = format!("{}/indexes", self.controller_url);
        self.post(&url, &request)
            .with_context(|| format!("Failed to create Pinecone index '{name}'"))?;
        Ok(())
    }

    fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let started = Instant::now();
        loop {
            let description = self.describe_index(name)?;
            let ready = description.status.as_ref().is_some_and(|s| s.ready);
            if ready && description.host.is_some() {
                return Ok(description);
            }

            if started.elapsed() >= self.ready_timeout {
                bail!(
                    "Pinecone index '{}' not ready after {:?}",
                    name,
                    self.ready_timeout
                );
            }

            debug!(
                "Waiting for index {} (state: {:?})",
                name,
                description.status.and_then(|s| s.state)
            );
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    fn fetch_stats(&self, dimension: usize) -> Result<IndexStats> {
        let url = format!("{}/describe_index_stats", self.data_plane(dimension)?);
        let body = self
            .post(&url, &serde_json::json!({}))
            .context("Failed to read Pinecone index stats")?;
        let stats: StatsResponse =
            serde_json::from_str(&body).context("Failed to parse Pinecone index stats")?;

        Ok(IndexStats {
            dimension: stats.dimension,
            total_vector_count: stats.total_vector_count,
            namespaces: stats
                .namespaces
                .into_iter()
                .map(|(name, summary)| (name, summary.vector_count))
                .collect(),
        })
    }

    /// Upserts are eventually consistent. Poll the namespace count until it
    /// reaches `expected`, giving up with a warning after the ready timeout.
    fn wait_until_visible(&self, target: &IndexTarget, expected: u64) -> Result<()> {
        let started = Instant::now();
        loop {
            let visible = self.fetch_stats(target.dimension)?.namespace_count(&target.namespace);
            if visible >= expected {
                debug!(
                    "{} vectors visible in namespace '{}'",
                    visible, target.namespace
                );
                return Ok(());
            }

            if started.elapsed() >= self.ready_timeout {
                warn!(
                    "Only {} of {} vectors visible in namespace '{}' after {:?}, continuing",
                    visible, expected, target.namespace, self.ready_timeout
                );
                return Ok(());
            }

            debug!(
                "Waiting for namespace '{}' ({}/{} vectors visible)",
                target.namespace, visible, expected
            );
            std::thread::sleep(VISIBILITY_POLL_INTERVAL);
        }
    }

    /// Resolve the data-plane URL for `dimension`, creating the index if needed
    fn data_plane(&self, dimension: usize) -> Result<String> {
        let cached = self
            .hosts
            .lock()
            .map_err(|_| anyhow!("Pinecone host cache poisoned"))?
            .get(&dimension)
            .cloned();
        if let Some(host) = cached {
            return Ok(host);
        }

        let name = self.index_name_for(dimension);
        let existing = self
            .list_indexes()?
            .into_iter()
            .find(|index| index.name == name);

        let description = match existing {
            Some(index) if index.dimension != dimension => {
                bail!(
                    "Pinecone index '{}' has dimension {} but {} was requested",
                    name,
                    index.dimension,
                    dimension
                );
            }
            Some(index) if index.status.as_ref().is_some_and(|s| s.ready) && index.host.is_some() => {
                index
            }
            Some(_) => self.wait_until_ready(&name)?,
            None => {
                self.create_index(&name, dimension)?;
                self.wait_until_ready(&name)?
            }
        };

        let host = description
            .host
            .map(|h| data_plane_url(&h))
            .ok_or_else(|| anyhow!("Pinecone index '{name}' has no host"))?;

        self.hosts
            .lock()
            .map_err(|_| anyhow!("Pinecone host cache poisoned"))?
            .insert(dimension, host.clone());
        Ok(host)
    }

    fn vector_metadata(&self, record: &VectorRecord) -> Map<String, Value> {
        let mut metadata = flatten_metadata(&record.metadata);
        metadata.insert(
            TEXT_KEY.to_string(),
            Value::String(truncate_chars(&record.text, self.text_limit).to_string()),
        );
        metadata.insert(
            DOCUMENT_ID_KEY.to_string(),
            Value::String(record.document_id.clone()),
        );
        metadata
    }
}

/// Hosts come back bare (`idx-abc.svc.pinecone.io`); tests pass full URLs
fn data_plane_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{host}")
    }
}

fn to_match(raw: QueryMatch) -> RetrievalMatch {
    let mut metadata = raw.metadata.unwrap_or_default();
    let text = match metadata.remove(TEXT_KEY) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let document_id = match metadata.remove(DOCUMENT_ID_KEY) {
        Some(Value::String(id)) => id,
        _ => raw.id.clone(),
    };

    RetrievalMatch {
        id: raw.id,
        document_id,
        score: raw.score,
        text,
        metadata,
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &'static str {
        "pinecone"
    }

    async fn upsert(&self, target: &IndexTarget, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != target.dimension) {
            bail!(
                "Vector '{}' has {} dimensions, index expects {}",
                bad.id,
                bad.vector.len(),
                target.dimension
            );
        }

        let url = format!("{}/vectors/upsert", self.data_plane(target.dimension)?);

        for batch in records.chunks(self.batch_size) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|record| PineconeVector {
                        id: &record.id,
                        values: &record.vector,
                        metadata: self.vector_metadata(record),
                    })
                    .collect(),
                namespace: &target.namespace,
            };
            self.post(&url, &request)
                .with_context(|| format!("Failed to upsert batch of {} vectors", batch.len()))?;
            debug!(
                "Upserted {} vectors into namespace '{}'",
                batch.len(),
                target.namespace
            );
        }

        let written = records.len();
        self.wait_until_visible(target, u64::try_from(written)?)?;
        info!(
            "Upserted {} vectors into Pinecone namespace '{}'",
            written, target.namespace
        );
        Ok(written)
    }

    async fn query(
        &self,
        target: &IndexTarget,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let url = format!("{}/query", self.data_plane(target.dimension)?);
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: &target.namespace,
        };

        let body = self.post(&url, &request).context("Pinecone query failed")?;
        let response: QueryResponse =
            serde_json::from_str(&body).context("Failed to parse Pinecone query response")?;

        Ok(response.matches.into_iter().map(to_match).collect())
    }

    async fn clear(&self, target: &IndexTarget) -> Result<()> {
        let url = format!("{}/vectors/delete", self.data_plane(target.dimension)?);
        let request = DeleteRequest {
            delete_all: true,
            namespace: &target.namespace,
        };

        match self.post(&url, &request) {
            Ok(_) => {
                info!("Cleared Pinecone namespace '{}'", target.namespace);
                Ok(())
            }
            Err(error)
                if error
                    .downcast_ref::<http::RequestError>()
                    .and_then(http::RequestError::status)
                    == Some(404) =>
            {
                warn!(
                    "Namespace '{}' does not exist, nothing to clear",
                    target.namespace
                );
                Ok(())
            }
            Err(error) => Err(error.context("Failed to clear Pinecone namespace")),
        }
    }

    async fn stats(&self, target: &IndexTarget) -> Result<IndexStats> {
        self.fetch_stats(target.dimension)
    }
}
