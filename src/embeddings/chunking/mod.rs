
use anyhow::{Result, bail};
use serde_json::{Map, Value};
use tracing::debug;

use crate::sources::Document;

/// A piece of a document ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// `{document_id}#{chunk_index}`
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
    pub metadata: Map<String, Value>,
}

/// Chunk size and overlap, both in estimated tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("Chunk size must be positive");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "Chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Chunk every document, preserving document order
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Result<Vec<DocumentChunk>> {
    config.validate()?;

    let mut chunks = Vec::new();
    for document in documents {
        chunks.extend(chunk_document(document, config)?);
    }

    debug!(
        "Chunked {} documents into {} chunks (size {}, overlap {})",
        documents.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}

/// Split one document into chunks of at most `chunk_size` tokens plus overlap
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<DocumentChunk>> {
    config.validate()?;

    if document.text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut splits = if estimate_token_count(&document.text) <= config.chunk_size {
        vec![document.text.trim().to_string()]
    } else {
        split_by_paragraphs(&document.text, config.chunk_size)
    };

    if config.chunk_overlap > 0 {
        add_overlap(&mut splits, config.chunk_overlap);
    }

    let chunks = splits
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| {
            let mut metadata = document.metadata.clone();
            metadata.insert(
                "document_id".to_string(),
                Value::String(document.id.clone()),
            );
            metadata.insert("chunk_index".to_string(), Value::from(chunk_index));

            DocumentChunk {
                id: format!("{}#{}", document.id, chunk_index),
                document_id: document.id.clone(),
                token_count: estimate_token_count(&text),
                text,
                chunk_index,
                metadata,
            }
        })
        .collect();

    Ok(chunks)
}

/// Accumulates pieces into splits no larger than `target` tokens
struct SplitBuilder<'a> {
    splits: &'a mut Vec<String>,
    current: String,
    words: usize,
    punctuation: usize,
    target: usize,
}

impl<'a> SplitBuilder<'a> {
    fn new(splits: &'a mut Vec<String>, target: usize) -> Self {
        Self {
            splits,
            current: String::new(),
            words: 0,
            punctuation: 0,
            target,
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let (words, punctuation) = text_counts(piece);
        let combined = token_estimate(self.words + words, self.punctuation + punctuation);
        if combined > self.target && !self.current.trim().is_empty() {
            self.flush();
        }
        self.current.push_str(piece);
        self.current.push_str(separator);
        self.words += words;
        self.punctuation += punctuation;
    }

    fn flush(&mut self) {
        let split = self.current.trim();
        if !split.is_empty() {
            self.splits.push(split.to_string());
        }
        self.current.clear();
        self.words = 0;
        self.punctuation = 0;
    }
}

/// Paragraphs first, then sentences, then words for oversized pieces
fn split_by_paragraphs(content: &str, target: usize) -> Vec<String> {
    let mut splits = Vec::new();
    let mut builder = SplitBuilder::new(&mut splits, target);

    for paragraph in content.split("\n\n").filter(|p| !p.trim().is_empty()) {
        let paragraph = paragraph.trim();
        if estimate_token_count(paragraph) <= target {
            builder.push(paragraph, "\n\n");
            continue;
        }

        for sentence in split_sentences(paragraph) {
            if estimate_token_count(&sentence) <= target {
                builder.push(&sentence, " ");
            } else {
                for word in sentence.split_whitespace() {
                    builder.push(word, " ");
                }
            }
        }
    }

    builder.flush();
    splits
}

/// Sentences keep their terminating punctuation
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
}

/// Prefix each chunk with the tail of its predecessor
fn add_overlap(splits: &mut [String], overlap_tokens: usize) {
    for i in (1..splits.len()).rev() {
        let overlap_text = extract_overlap_text(&splits[i - 1], overlap_tokens);
        if !overlap_text.is_empty() {
            splits[i] = format!("{}\n\n{}", overlap_text, splits[i]);
        }
    }
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize; // Rough word-to-token ratio

    if word_count == 0 || words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count..].join(" ")
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    let (words, punctuation) = text_counts(text);
    token_estimate(words, punctuation)
}

fn text_counts(text: &str) -> (usize, usize) {
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    (word_count, punct_count)
}

fn token_estimate(words: usize, punctuation: usize) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    (punctuation as f64).mul_add(0.1, words as f64 / 0.75) as usize
}
