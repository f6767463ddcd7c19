use super::*;
use crate::llm::Completion;
use crate::vector_store::IndexStats;
use async_trait::async_trait;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const KEYWORDS: [&str; 4] = ["rust", "python", "cooking", "music"];

struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|k| if lower.contains(k) { 1.0 } else { 0.01 })
                    .collect()
            })
            .collect())
    }
}

#[derive(Default)]
struct MemoryIndex {
    namespaces: Mutex<HashMap<String, Vec<VectorRecord>>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm(a) * norm(b))
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, target: &IndexTarget, records: &[VectorRecord]) -> Result<usize> {
        let mut namespaces = self.namespaces.lock().expect("lock");
        namespaces
            .entry(target.namespace.clone())
            .or_default()
            .extend_from_slice(records);
        Ok(records.len())
    }

    async fn query(
        &self,
        target: &IndexTarget,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let namespaces = self.namespaces.lock().expect("lock");
        let mut matches: Vec<RetrievalMatch> = namespaces
            .get(&target.namespace)
            .map(|records| {
                records
                    .iter()
                    .map(|r| RetrievalMatch {
                        id: r.id.clone(),
                        document_id: r.document_id.clone(),
                        score: cosine(vector, &r.vector),
                        text: r.text.clone(),
                        metadata: Map::new(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn clear(&self, target: &IndexTarget) -> Result<()> {
        self.namespaces
            .lock()
            .expect("lock")
            .remove(&target.namespace);
        Ok(())
    }

    async fn stats(&self, target: &IndexTarget) -> Result<IndexStats> {
        let namespaces = self.namespaces.lock().expect("lock");
        let mut stats = IndexStats {
            dimension: target.dimension,
            ..IndexStats::default()
        };
        for (name, records) in namespaces.iter() {
            stats.namespaces.insert(name.clone(), records.len() as u64);
            stats.total_vector_count += records.len() as u64;
        }
        Ok(stats)
    }
}

struct CannedChat {
    answer: String,
    usage: Option<TokenUsage>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl CannedChat {
    fn new(answer: &str, usage: Option<TokenUsage>) -> Self {
        Self {
            answer: answer.to_string(),
            usage,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }
}

impl ChatModel for CannedChat {
    fn model(&self) -> &str {
        "canned"
    }

    fn complete(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().expect("lock") = messages.to_vec();
        Ok(Completion {
            content: self.answer.clone(),
            usage: self.usage,
        })
    }
}

fn document(id: &str, text: &str) -> Document {
    Document {
        id: id.to_string(),
        text: text.to_string(),
        metadata: Map::new(),
    }
}

fn corpus() -> Vec<Document> {
    vec![
        document("rust-doc", "Rust is a systems programming language focused on safety."),
        document("cooking-doc", "Cooking pasta requires salted boiling water."),
        document("music-doc", "Music theory describes scales and chords."),
    ]
}

#[tokio::test]
async fn index_then_query_returns_relevant_sources() {
    let embedder = KeywordEmbedder;
    let index = MemoryIndex::default();
    let chat = CannedChat::new(
        "Rust is a safe systems language.",
        Some(TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 10,
            total_tokens: 110,
        }),
    );
    let pipeline = RagPipeline::new(&embedder, &index, &chat);
    let target = IndexTarget::new("test", KEYWORDS.len());

    let summary = pipeline
        .index_documents(&corpus(), &ChunkingConfig::new(256, 0), &target)
        .await
        .expect("indexing should succeed");
    assert_eq!(summary.documents, 3);
    assert_eq!(summary.chunks, 3);
    assert!(summary.tokens > 0);

    let options = QueryOptions {
        top_k: 2,
        ..QueryOptions::default()
    };
    let answer = pipeline
        .query("What is Rust?", &options, &target)
        .await
        .expect("query should succeed");

    assert_eq!(answer.answer, "Rust is a safe systems language.");
    assert_eq!(answer.retrieved.len(), 2);
    assert_eq!(answer.retrieved[0].document_id, "rust-doc");
    assert_eq!(answer.sources[0].id, "rust-doc#0");
    assert!(answer.sources[0].text.ends_with("..."));
    assert_eq!(answer.usage.total_tokens, 110);
    assert!(!answer.usage_estimated);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);

    let messages = chat.last_messages.lock().expect("lock");
    assert_eq!(messages[0].content, SYSTEM_MESSAGE);
    assert!(messages[1].content.contains("Document 1:\nRust is a systems"));
    assert!(messages[1].content.contains("Question: What is Rust?"));
}

#[tokio::test]
async fn empty_retrieval_skips_the_llm() {
    let embedder = KeywordEmbedder;
    let index = MemoryIndex::default();
    let chat = CannedChat::new("unused", None);
    let pipeline = RagPipeline::new(&embedder, &index, &chat);

    let answer = pipeline
        .query(
            "Anything?",
            &QueryOptions::default(),
            &IndexTarget::new("empty", KEYWORDS.len()),
        )
        .await
        .expect("query should succeed");

    assert_eq!(answer.answer, NO_DOCUMENTS_ANSWER);
    assert!(answer.sources.is_empty());
    assert!(answer.retrieved.is_empty());
    assert_eq!(answer.usage, TokenUsage::default());
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_usage_is_estimated() {
    let embedder = KeywordEmbedder;
    let index = MemoryIndex::default();
    let chat = CannedChat::new("Pasta needs salted water.", None);
    let pipeline = RagPipeline::new(&embedder, &index, &chat);
    let target = IndexTarget::new("", KEYWORDS.len());

    pipeline
        .index_documents(&corpus(), &ChunkingConfig::default(), &target)
        .await
        .expect("indexing should succeed");

    let answer = pipeline
        .query("How is cooking pasta done?", &QueryOptions::default(), &target)
        .await
        .expect("query should succeed");

    assert!(answer.usage_estimated);
    assert!(answer.usage.prompt_tokens > 0);
    assert!(answer.usage.completion_tokens > 0);
    assert_eq!(
        answer.usage.total_tokens,
        answer.usage.prompt_tokens + answer.usage.completion_tokens
    );
}

#[tokio::test]
async fn indexing_nothing_is_a_no_op() {
    let embedder = KeywordEmbedder;
    let index = MemoryIndex::default();
    let chat = CannedChat::new("unused", None);
    let pipeline = RagPipeline::new(&embedder, &index, &chat);
    let target = IndexTarget::new("none", KEYWORDS.len());

    let summary = pipeline
        .index_documents(&[], &ChunkingConfig::default(), &target)
        .await
        .expect("should succeed");
    assert_eq!(summary, IndexingSummary::default());

    let stats = pipeline.index_stats(&target).await.expect("stats");
    assert_eq!(stats.total_vector_count, 0);
}

#[test]
fn source_preview_is_char_safe() {
    let m = RetrievalMatch {
        id: "x#0".to_string(),
        document_id: "x".to_string(),
        score: 0.5,
        text: "ü".repeat(300),
        metadata: Map::new(),
    };
    let preview = SourcePreview::from(&m);
    assert_eq!(preview.text.chars().count(), 203);
    assert!(preview.text.ends_with("..."));
}
