
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::http;
use crate::rag::prompt::PromptTemplate;

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm:latest";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_keys: ApiKeysConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub search_space: SearchSpaceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Document source connection, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Supabase(SupabaseConfig),
    Mongodb(MongoConfig),
    Postgresql(PostgresConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub table: String,
    pub text_column: String,
    pub id_column: String,
}

impl Default for SupabaseConfig {
    #[inline]
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: "documents".to_string(),
            text_column: "content".to_string(),
            id_column: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MongoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub text_column: String,
    pub id_column: String,
}

impl Default for MongoConfig {
    #[inline]
    fn default() -> Self {
        Self {
            connection_string: None,
            database: None,
            collection: None,
            text_column: "content".to_string(),
            id_column: "_id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostgresConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub table: String,
    pub text_column: String,
    pub id_column: String,
}

impl Default for PostgresConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: None,
            port: 5432,
            database: None,
            user: None,
            password: None,
            table: "documents".to_string(),
            text_column: "content".to_string(),
            id_column: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeysConfig {
    pub groq: String,
    #[serde(default)]
    pub pinecone: String,
    #[serde(default = "default_pinecone_index")]
    pub pinecone_index: String,
}

fn default_pinecone_index() -> String {
    "autorag".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizationConfig {
    pub num_experiments: u32,
    pub test_questions: u32,
    pub fetch_limit: u32,
    pub seed: u64,
    pub keep_trial_vectors: bool,
    pub priorities: Priorities,
}

impl Default for OptimizationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            num_experiments: 20,
            test_questions: 50,
            fetch_limit: 100,
            seed: 42,
            keep_trial_vectors: false,
            priorities: Priorities::default(),
        }
    }
}

/// Relative weight of each objective when picking the recommended trial
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Priorities {
    pub accuracy: f64,
    pub cost: f64,
    pub latency: f64,
}

impl Default for Priorities {
    #[inline]
    fn default() -> Self {
        Self {
            accuracy: 0.6,
            cost: 0.2,
            latency: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSpaceConfig {
    pub chunk_sizes: Vec<usize>,
    pub chunk_overlaps: Vec<usize>,
    pub top_k: Vec<usize>,
    pub prompt_templates: Vec<PromptTemplate>,
    pub embedding_models: Vec<EmbeddingModelSpec>,
}

impl Default for SearchSpaceConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_sizes: vec![256, 512],
            chunk_overlaps: vec![0, 50],
            top_k: vec![3, 5, 10],
            prompt_templates: vec![PromptTemplate::Default, PromptTemplate::Concise],
            embedding_models: vec![EmbeddingModelSpec::default()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingModelSpec {
    pub name: String,
    #[serde(default)]
    pub cost_per_million_tokens: f64,
}

impl Default for EmbeddingModelSpec {
    #[inline]
    fn default() -> Self {
        Self {
            name: DEFAULT_EMBEDDING_MODEL.to_string(),
            cost_per_million_tokens: 0.0,
        }
    }
}

/// Ollama embedding server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub dimension: u32,
    pub cost_per_million_tokens: f64,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: 32,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            cost_per_million_tokens: 0.0,
            timeout_seconds: 30,
            retry_attempts: http::DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

/// OpenAI-compatible chat completion endpoint (Groq by default)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for LlmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 500,
            input_cost_per_million: 0.59,
            output_cost_per_million: 0.79,
            timeout_seconds: 60,
            retry_attempts: http::DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Pinecone,
    Lancedb,
}

impl std::fmt::Display for VectorBackend {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            VectorBackend::Pinecone => write!(f, "pinecone"),
            VectorBackend::Lancedb => write!(f, "lancedb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub controller_url: String,
    pub cloud: String,
    pub region: String,
    pub metric: String,
    pub upsert_batch_size: usize,
    pub metadata_text_limit: usize,
    pub ready_timeout_seconds: u64,
}

impl Default for VectorStoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            backend: VectorBackend::Pinecone,
            controller_url: "https://api.pinecone.io".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            metric: "cosine".to_string(),
            upsert_batch_size: 100,
            metadata_text_limit: 1000,
            ready_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}\nRun 'autorag init' to create one.")]
    FileNotFound(PathBuf),
    #[error("Data directory not found or could not be determined")]
    DirectoryError,
    #[error("{field} is required when database type is '{database}'")]
    MissingField {
        database: &'static str,
        field: &'static str,
    },
    #[error("{0} API key cannot be empty")]
    EmptyApiKey(&'static str),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid number of experiments: {0} (must be between 1 and 100)")]
    InvalidExperimentCount(u32),
    #[error("Invalid number of test questions: {0} (must be between 10 and 500)")]
    InvalidTestQuestionCount(u32),
    #[error("Invalid fetch limit: {0} (must be between 1 and 10000)")]
    InvalidFetchLimit(u32),
    #[error("Invalid priorities: {0}")]
    InvalidPriorities(String),
    #[error("Search space list '{0}' cannot be empty")]
    EmptySearchSpace(&'static str),
    #[error("Invalid chunk size: {0} (must be between 32 and 4096)")]
    InvalidChunkSize(usize),
    #[error("Invalid chunk overlap: {0} (must be at most 1024)")]
    InvalidChunkOverlap(usize),
    #[error("Every chunk overlap is at least as large as every chunk size")]
    NoValidChunking,
    #[error("Invalid top-k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f64),
    #[error("Invalid max tokens: {0} (must be between 1 and 32768)")]
    InvalidMaxTokens(u32),
    #[error("Invalid cost: {0} (must be a non-negative number)")]
    InvalidCost(f64),
    #[error("Invalid metric: {0} (must be 'cosine', 'euclidean' or 'dotproduct')")]
    InvalidMetric(String),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidUpsertBatchSize(usize),
    #[error("Invalid metadata text limit: {0} (must be between 1 and 40000)")]
    InvalidMetadataTextLimit(usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Pinecone index name cannot be empty")]
    EmptyIndexName,
    #[error("Invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

const TEMPLATE_HEADER: &str = "\
# autorag configuration
#
# database.type is one of \"supabase\", \"mongodb\" or \"postgresql\".
# vector_store.backend is \"pinecone\" (needs api_keys.pinecone) or \"lancedb\" (local).
# Every other section is optional and falls back to the values shown here.

";

impl Config {
    /// Load and validate the configuration at `path`
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();

        if !config_path.exists() {
            return Err(ConfigError::FileNotFound(config_path.to_path_buf()).into());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML syntax in {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_path = path.as_ref();
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// A complete configuration with placeholder credentials, used by `autorag init`
    #[inline]
    pub fn template() -> Self {
        Self {
            database: DatabaseConfig::Supabase(SupabaseConfig {
                url: Some("https://your-project.supabase.co".to_string()),
                key: Some("your-supabase-service-key".to_string()),
                ..SupabaseConfig::default()
            }),
            api_keys: ApiKeysConfig {
                groq: "gsk_your_groq_key".to_string(),
                pinecone: "your-pinecone-key".to_string(),
                pinecone_index: default_pinecone_index(),
            },
            optimization: OptimizationConfig::default(),
            search_space: SearchSpaceConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            vector_store: VectorStoreConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Render the template with an explanatory header
    #[inline]
    pub fn template_toml() -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(&Self::template())?;
        Ok(format!("{TEMPLATE_HEADER}{body}"))
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.api_keys.validate(self.vector_store.backend)?;
        self.optimization.validate()?;
        self.search_space.validate()?;
        self.embedding.validate()?;
        self.llm.validate()?;
        self.vector_store.validate()?;
        Ok(())
    }

    /// Directory holding the results database, local vectors and reports
    #[inline]
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        self.storage.data_dir.clone().map_or_else(
            || {
                dirs::data_local_dir()
                    .map(|dir| dir.join("autorag"))
                    .ok_or(ConfigError::DirectoryError)
            },
            Ok,
        )
    }

    /// Get the path for the SQLite results database
    #[inline]
    pub fn results_database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("results.db"))
    }

    /// Get the path for the local vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("vectors"))
    }

    #[inline]
    pub fn reports_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("reports"))
    }
}

impl DatabaseConfig {
    #[inline]
    pub fn database_type(&self) -> &'static str {
        match *self {
            DatabaseConfig::Supabase(_) => "supabase",
            DatabaseConfig::Mongodb(_) => "mongodb",
            DatabaseConfig::Postgresql(_) => "postgresql",
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DatabaseConfig::Supabase(supabase) => {
                let url = required(supabase.url.as_deref(), "supabase", "Supabase URL")?;
                let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(ConfigError::InvalidProtocol(parsed.scheme().to_string()));
                }
                required(supabase.key.as_deref(), "supabase", "Supabase key")?;
                validate_identifier(&supabase.table)?;
            }
            DatabaseConfig::Mongodb(mongo) => {
                required(
                    mongo.connection_string.as_deref(),
                    "mongodb",
                    "MongoDB connection string",
                )?;
            }
            DatabaseConfig::Postgresql(postgres) => {
                required(postgres.host.as_deref(), "postgresql", "PostgreSQL host")?;
                if postgres.port == 0 {
                    return Err(ConfigError::InvalidPort(postgres.port));
                }
                validate_identifier(&postgres.table)?;
                validate_identifier(&postgres.text_column)?;
                validate_identifier(&postgres.id_column)?;
            }
        }
        Ok(())
    }
}

fn required<'a>(
    value: Option<&'a str>,
    database: &'static str,
    field: &'static str,
) -> Result<&'a str, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingField { database, field })
}

/// Accept plain SQL identifiers only (letters, digits, underscores, optional schema prefix)
#[inline]
pub fn validate_identifier(identifier: &str) -> Result<(), ConfigError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_part(p)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(identifier.to_string()))
    }
}

impl ApiKeysConfig {
    #[inline]
    pub fn validate(&self, backend: VectorBackend) -> Result<(), ConfigError> {
        if self.groq.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey("Groq"));
        }

        if backend == VectorBackend::Pinecone {
            if self.pinecone.trim().is_empty() {
                return Err(ConfigError::EmptyApiKey("Pinecone"));
            }
            if self.pinecone_index.trim().is_empty() {
                return Err(ConfigError::EmptyIndexName);
            }
        }

        Ok(())
    }
}

/// Show only the first eight characters of a secret
#[inline]
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{prefix}...")
}

impl OptimizationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.num_experiments) {
            return Err(ConfigError::InvalidExperimentCount(self.num_experiments));
        }

        if !(10..=500).contains(&self.test_questions) {
            return Err(ConfigError::InvalidTestQuestionCount(self.test_questions));
        }

        if !(1..=10_000).contains(&self.fetch_limit) {
            return Err(ConfigError::InvalidFetchLimit(self.fetch_limit));
        }

        self.priorities.validate()
    }

    #[inline]
    pub fn set_num_experiments(&mut self, num_experiments: u32) -> Result<(), ConfigError> {
        if !(1..=100).contains(&num_experiments) {
            return Err(ConfigError::InvalidExperimentCount(num_experiments));
        }
        self.num_experiments = num_experiments;
        Ok(())
    }

    #[inline]
    pub fn set_test_questions(&mut self, test_questions: u32) -> Result<(), ConfigError> {
        if !(10..=500).contains(&test_questions) {
            return Err(ConfigError::InvalidTestQuestionCount(test_questions));
        }
        self.test_questions = test_questions;
        Ok(())
    }
}

impl Priorities {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.accuracy, self.cost, self.latency];

        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::InvalidPriorities(
                "weights must be finite and non-negative".to_string(),
            ));
        }

        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::InvalidPriorities(
                "at least one weight must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl SearchSpaceConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_sizes.is_empty() {
            return Err(ConfigError::EmptySearchSpace("chunk_sizes"));
        }
        if self.chunk_overlaps.is_empty() {
            return Err(ConfigError::EmptySearchSpace("chunk_overlaps"));
        }
        if self.embedding_models.is_empty() {
            return Err(ConfigError::EmptySearchSpace("embedding_models"));
        }
        if self.top_k.is_empty() {
            return Err(ConfigError::EmptySearchSpace("top_k"));
        }
        if self.prompt_templates.is_empty() {
            return Err(ConfigError::EmptySearchSpace("prompt_templates"));
        }

        if let Some(&size) = self
            .chunk_sizes
            .iter()
            .find(|s| !(32..=4096).contains(*s))
        {
            return Err(ConfigError::InvalidChunkSize(size));
        }

        if let Some(&overlap) = self.chunk_overlaps.iter().find(|o| **o > 1024) {
            return Err(ConfigError::InvalidChunkOverlap(overlap));
        }

        let any_valid = self
            .chunk_sizes
            .iter()
            .any(|size| self.chunk_overlaps.iter().any(|overlap| overlap < size));
        if !any_valid {
            return Err(ConfigError::NoValidChunking);
        }

        if let Some(&k) = self.top_k.iter().find(|k| !(1..=100).contains(*k)) {
            return Err(ConfigError::InvalidTopK(k));
        }

        for model in &self.embedding_models {
            if model.name.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.name.clone()));
            }
            validate_cost(model.cost_per_million_tokens)?;
        }

        Ok(())
    }
}

fn validate_retry_attempts(attempts: u32) -> Result<(), ConfigError> {
    if (1..=http::MAX_RETRY_ATTEMPTS).contains(&attempts) {
        Ok(())
    } else {
        Err(ConfigError::InvalidRetryAttempts(attempts))
    }
}

fn validate_cost(cost: f64) -> Result<(), ConfigError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCost(cost))
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(self.host.clone()));
        }
        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        validate_retry_attempts(self.retry_attempts)?;

        validate_cost(self.cost_per_million_tokens)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed =
            Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(parsed.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=32_768).contains(&self.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        validate_retry_attempts(self.retry_attempts)?;

        validate_cost(self.input_cost_per_million)?;
        validate_cost(self.output_cost_per_million)
    }
}

impl VectorStoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == VectorBackend::Pinecone {
            Url::parse(&self.controller_url)
                .map_err(|_| ConfigError::InvalidUrl(self.controller_url.clone()))?;
        }

        if !matches!(self.metric.as_str(), "cosine" | "euclidean" | "dotproduct") {
            return Err(ConfigError::InvalidMetric(self.metric.clone()));
        }

        if !(1..=1000).contains(&self.upsert_batch_size) {
            return Err(ConfigError::InvalidUpsertBatchSize(self.upsert_batch_size));
        }

        if !(1..=40_000).contains(&self.metadata_text_limit) {
            return Err(ConfigError::InvalidMetadataTextLimit(
                self.metadata_text_limit,
            ));
        }

        Ok(())
    }
}
