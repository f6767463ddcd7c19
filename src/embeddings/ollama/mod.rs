
use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{Embedder, EmbedderFactory};
use crate::config::EmbeddingConfig;
use crate::http;

const DEFAULT_TAG: &str = "latest";

/// Embedding client for a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// One entry of `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Invalid Ollama address in [embedding]")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            agent: http::build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts,
        })
    }

    /// Same server and settings, different embedding model
    #[inline]
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = http::build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build Ollama URL for {path}"))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let body = http::with_retry(url.as_str(), self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .call()
                .map_err(http::AttemptError::from)
                .and_then(http::read_text)
        })?;
        serde_json::from_str(&body).with_context(|| format!("Unexpected response from {url}"))
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, request: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        let payload =
            serde_json::to_string(request).context("Failed to serialize Ollama request")?;
        let body = http::with_retry(url.as_str(), self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .map_err(http::AttemptError::from)
                .and_then(http::read_text)
        })?;
        serde_json::from_str(&body).with_context(|| format!("Unexpected response from {url}"))
    }

    /// Check that the server answers and has the configured model pulled
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Checking Ollama at {}", self.base_url);
        self.validate_model()
            .with_context(|| format!("Ollama health check failed for {}", self.base_url))?;
        info!("Ollama at {} serves {}", self.base_url, self.model);
        Ok(())
    }

    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;
        if models.iter().any(|m| same_model(&m.name, &self.model)) {
            debug!("Model {} is available", self.model);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!("Model {} missing, server has {:?}", self.model, available);
        Err(anyhow!(
            "Model '{}' is not available (found {:?}). Run 'ollama pull {}'",
            self.model,
            available,
            self.model
        ))
    }

    /// Models pulled on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let tags: TagsResponse = self.get_json("/api/tags")?;
        debug!("Ollama reports {} models", tags.models.len());
        Ok(tags.models)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response: EmbedResponse = self.post_json(
            "/api/embed",
            &EmbedRequest {
                model: &self.model,
                input: texts,
            },
        )?;

        if response.embeddings.len() != texts.len() {
            bail!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            );
        }
        Ok(response.embeddings)
    }
}

/// Ollama names without a tag refer to `:latest`
fn same_model(available: &str, wanted: &str) -> bool {
    let with_tag = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:{DEFAULT_TAG}")
        }
    };
    with_tag(available) == with_tag(wanted)
}

impl Embedder for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size as usize).enumerate() {
            debug!("Embedding batch {} ({} texts) with {}", i + 1, batch.len(), self.model);
            let embedded = self
                .embed_batch(batch)
                .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

impl EmbedderFactory for OllamaClient {
    fn embedder_for(&self, model: &str) -> Result<Box<dyn Embedder>> {
        Ok(Box::new(self.with_model(model)))
    }
}
