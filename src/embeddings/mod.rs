// Embeddings module
// Ollama integration and document chunking

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{
    ChunkingConfig, DocumentChunk, chunk_document, chunk_documents, estimate_token_count,
};
pub use ollama::OllamaClient;

/// Turns text into fixed-length vectors
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// One vector per input, in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Hands out an embedder per model name
pub trait EmbedderFactory: Send + Sync {
    fn embedder_for(&self, model: &str) -> Result<Box<dyn Embedder>>;
}
