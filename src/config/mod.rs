// Configuration management module
// Loads, validates and templates the TOML configuration file

pub mod settings;


pub use settings::{
    ApiKeysConfig, Config, ConfigError, DatabaseConfig, EmbeddingConfig, EmbeddingModelSpec,
    LlmConfig, MongoConfig, OptimizationConfig, PostgresConfig, Priorities, SearchSpaceConfig,
    StorageConfig, SupabaseConfig, VectorBackend, VectorStoreConfig, mask_secret,
    validate_identifier,
};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "autorag.toml";
