// Retrieval-augmented generation over the pluggable backends

#[cfg(test)]
mod tests;

pub mod prompt;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::embeddings::{ChunkingConfig, Embedder, chunk_documents, estimate_token_count};
use crate::llm::{ChatMessage, ChatModel, CompletionOptions, TokenUsage};
use crate::sources::Document;
use crate::vector_store::{IndexTarget, RetrievalMatch, VectorIndex, VectorRecord, truncate_chars};

pub use prompt::{PromptTemplate, SYSTEM_MESSAGE, build_context};

pub const NO_DOCUMENTS_ANSWER: &str = "No relevant documents found in the database.";
const SOURCE_PREVIEW_CHARS: usize = 200;

/// Short view of a retrieved chunk for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePreview {
    pub id: String,
    pub document_id: String,
    pub score: f32,
    pub text: String,
}

impl From<&RetrievalMatch> for SourcePreview {
    #[inline]
    fn from(m: &RetrievalMatch) -> Self {
        Self {
            id: m.id.clone(),
            document_id: m.document_id.clone(),
            score: m.score,
            text: format!("{}...", truncate_chars(&m.text, SOURCE_PREVIEW_CHARS)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourcePreview>,
    pub retrieved: Vec<RetrievalMatch>,
    /// Zero when no LLM call was made
    pub usage: TokenUsage,
    /// True when the provider omitted usage and it was estimated from text
    pub usage_estimated: bool,
    pub latency: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingSummary {
    pub documents: usize,
    pub chunks: usize,
    /// Estimated tokens sent to the embedder
    pub tokens: usize,
}

/// Per-query settings
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub top_k: usize,
    pub temperature: f64,
    pub max_tokens: u32,
    pub template: PromptTemplate,
}

impl Default for QueryOptions {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 5,
            temperature: 0.7,
            max_tokens: 500,
            template: PromptTemplate::Default,
        }
    }
}

pub struct RagPipeline<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    chat: &'a dyn ChatModel,
}

impl<'a> RagPipeline<'a> {
    #[inline]
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        chat: &'a dyn ChatModel,
    ) -> Self {
        Self {
            embedder,
            index,
            chat,
        }
    }

    /// Chunk, embed and upsert documents into `target`
    #[inline]
    pub async fn index_documents(
        &self,
        documents: &[Document],
        chunking: &ChunkingConfig,
        target: &IndexTarget,
    ) -> Result<IndexingSummary> {
        if documents.is_empty() {
            return Ok(IndexingSummary::default());
        }

        let chunks = chunk_documents(documents, chunking)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let embeddings = self
            .embedder
            .embed(&texts)
            .with_context(|| format!("Failed to embed {} chunks", texts.len()))?;

        if embeddings.len() != chunks.len() {
            bail!(
                "Mismatch: {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.id,
                vector,
                document_id: chunk.document_id,
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        self.index
            .upsert(target, &records)
            .await
            .context("Failed to store vectors")?;

        let summary = IndexingSummary {
            documents: documents.len(),
            chunks: records.len(),
            tokens: texts.iter().map(|t| estimate_token_count(t)).sum(),
        };
        info!(
            "Indexed {} documents as {} chunks into namespace '{}'",
            summary.documents, summary.chunks, target.namespace
        );
        Ok(summary)
    }

    /// Answer `question` from the documents stored in `target`
    #[inline]
    pub async fn query(
        &self,
        question: &str,
        options: &QueryOptions,
        target: &IndexTarget,
    ) -> Result<RagAnswer> {
        let started = Instant::now();

        let query_vector = self
            .embedder
            .embed(&[question.to_string()])
            .context("Failed to embed question")?
            .into_iter()
            .next()
            .context("Embedder returned no vector for the question")?;

        let retrieved = self
            .index
            .query(target, &query_vector, options.top_k)
            .await
            .context("Similarity search failed")?;

        if retrieved.is_empty() {
            debug!("No matches for question in namespace '{}'", target.namespace);
            return Ok(RagAnswer {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
                retrieved,
                usage: TokenUsage::default(),
                usage_estimated: false,
                latency: started.elapsed(),
            });
        }

        let context = build_context(&retrieved);
        let prompt = options.template.render(question, &context);
        let messages = [ChatMessage::system(SYSTEM_MESSAGE), ChatMessage::user(prompt)];

        let completion = self
            .chat
            .complete(
                &messages,
                &CompletionOptions {
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                },
            )
            .context("Failed to generate answer")?;

        let (usage, usage_estimated) = match completion.usage {
            Some(usage) => (usage, false),
            None => (estimate_usage(&messages, &completion.content), true),
        };

        Ok(RagAnswer {
            sources: retrieved.iter().map(SourcePreview::from).collect(),
            answer: completion.content,
            retrieved,
            usage,
            usage_estimated,
            latency: started.elapsed(),
        })
    }

    #[inline]
    pub async fn index_stats(&self, target: &IndexTarget) -> Result<crate::vector_store::IndexStats> {
        self.index.stats(target).await
    }

    #[inline]
    pub async fn clear_index(&self, target: &IndexTarget) -> Result<()> {
        self.index.clear(target).await
    }
}

fn estimate_usage(messages: &[ChatMessage], answer: &str) -> TokenUsage {
    let prompt_tokens: u64 = messages
        .iter()
        .map(|m| estimate_token_count(&m.content) as u64)
        .sum();
    let completion_tokens = estimate_token_count(answer) as u64;
    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}
