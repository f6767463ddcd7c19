use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutoRagError>;

#[derive(Error, Debug)]
pub enum AutoRagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod llm;
pub mod optimizer;
pub mod rag;
pub mod report;
pub mod sources;
pub mod vector_store;
