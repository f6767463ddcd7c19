use super::*;
use crate::config::{EmbeddingModelSpec, Priorities, SearchSpaceConfig};
use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, Completion, CompletionOptions, TokenUsage};
use crate::rag::PromptTemplate;
use crate::vector_store::{IndexStats, RetrievalMatch, VectorRecord};
use async_trait::async_trait;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

const KEYWORDS: [&str; 3] = ["rust", "cooking", "music"];

struct KeywordEmbedder {
    model: String,
}

impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.model == "broken" {
            bail!("model not loaded");
        }
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

struct KeywordFactory;

impl EmbedderFactory for KeywordFactory {
    fn embedder_for(&self, model: &str) -> Result<Box<dyn Embedder>> {
        Ok(Box::new(KeywordEmbedder {
            model: model.to_string(),
        }))
    }
}

#[derive(Default)]
struct MemoryIndex {
    namespaces: Mutex<HashMap<String, Vec<VectorRecord>>>,
}

impl MemoryIndex {
    fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces
            .lock()
            .expect("lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, target: &IndexTarget, records: &[VectorRecord]) -> Result<usize> {
        self.namespaces
            .lock()
            .expect("lock")
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
                        score: r.vector.iter().zip(vector).map(|(a, b)| a * b).sum(),
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

    async fn stats(&self, _target: &IndexTarget) -> Result<IndexStats> {
        Ok(IndexStats::default())
    }
}

/// Writes questions about whichever topic the document covers and answers
/// RAG prompts with the topic of the first context block
struct TopicChat;

fn topic_of(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .copied()
        .find(|k| lower.contains(k))
        .unwrap_or("nothing")
}

impl ChatModel for TopicChat {
    fn model(&self) -> &str {
        "topic"
    }

    fn complete(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<Completion> {
        let prompt = &messages[1].content;
        let content = if prompt.contains("Respond with JSON") {
            let topic = topic_of(prompt.split("Document:").nth(1).unwrap_or_default());
            format!(r#"{{"question": "What about {topic}?", "answer": "It is about {topic}."}}"#)
        } else {
            let first_block = prompt
                .split("Document 1:")
                .nth(1)
                .and_then(|rest| rest.split("Document 2:").next())
                .unwrap_or_default();
            format!("It is about {}.", topic_of(first_block))
        };
        Ok(Completion {
            content,
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 10,
                total_tokens: 110,
            }),
        })
    }
}

fn corpus() -> Vec<Document> {
    [
        ("rust-1", "Rust guarantees memory safety without a garbage collector."),
        ("cooking-1", "Cooking rice needs twice as much water as rice."),
        ("music-1", "Music in four-four time has four beats per bar."),
    ]
    .into_iter()
    .map(|(id, text)| Document {
        id: id.to_string(),
        text: text.to_string(),
        metadata: Map::new(),
    })
    .collect()
}

fn config(models: &[&str]) -> Config {
    let mut config = Config::template();
    config.optimization.num_experiments = 10;
    config.optimization.test_questions = 3;
    config.optimization.priorities = Priorities::default();
    config.search_space = SearchSpaceConfig {
        chunk_sizes: vec![256],
        chunk_overlaps: vec![0],
        top_k: vec![1, 3],
        prompt_templates: vec![PromptTemplate::Default],
        embedding_models: models
            .iter()
            .map(|name| EmbeddingModelSpec {
                name: (*name).to_string(),
                cost_per_million_tokens: 0.1,
            })
            .collect(),
    };
    config
}

async fn database() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::open(&temp_dir.path().join("results.db"))
        .await
        .expect("Failed to open database");
    (temp_dir, database)
}

#[tokio::test]
async fn sweep_evaluates_every_trial_and_recommends_one() {
    let (_temp_dir, database) = database().await;
    let config = config(&["keyword"]);
    let index = MemoryIndex::default();
    let optimizer = Optimizer::new(&config, &KeywordFactory, &index, &TopicChat, &database);

    let outcome = optimizer.run(&corpus()).await.expect("run should succeed");

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.total_trials, 2);
    assert_eq!(outcome.run.completed_trials, 2);
    assert_eq!(outcome.run.num_questions, 3);
    assert_eq!(outcome.trials.len(), 2);

    for trial in &outcome.trials {
        let metrics = trial.metrics().expect("trial should have metrics");
        assert!((metrics.accuracy - 1.0).abs() < 1e-9);
        assert!((metrics.hit_rate - 1.0).abs() < 1e-9);
        assert!(metrics.cost_per_query > 0.0);
        assert!(metrics.indexing_cost > 0.0);
        assert_eq!(metrics.chunks, 3);
        assert_eq!(metrics.questions, 3);
    }

    let recommended = outcome.recommended.expect("should recommend a trial");
    assert!(outcome.frontier.contains(&recommended));
    let record = outcome.recommended_trial().expect("recommended trial is stored");
    assert!(record.is_pareto);
    assert_eq!(outcome.run.recommended_trial, Some(recommended as i64));

    let pairs = database
        .qa_pairs_for_run(&outcome.run.id)
        .await
        .expect("qa pairs should load");
    assert_eq!(pairs.len(), 3);

    // trial namespaces are cleaned up
    assert!(index.namespace_names().is_empty());
}

#[tokio::test]
async fn trial_vectors_can_be_kept() {
    let (_temp_dir, database) = database().await;
    let mut config = config(&["keyword"]);
    config.optimization.keep_trial_vectors = true;
    let index = MemoryIndex::default();
    let optimizer = Optimizer::new(&config, &KeywordFactory, &index, &TopicChat, &database);

    let outcome = optimizer.run(&corpus()).await.expect("run should succeed");

    assert_eq!(
        index.namespace_names(),
        vec![
            trial_namespace(&outcome.run.id, 0),
            trial_namespace(&outcome.run.id, 1)
        ]
    );
}

#[tokio::test]
async fn failing_trials_are_recorded_and_skipped() {
    let (_temp_dir, database) = database().await;
    let config = config(&["keyword", "broken"]);
    let index = MemoryIndex::default();
    let optimizer = Optimizer::new(&config, &KeywordFactory, &index, &TopicChat, &database);

    let outcome = optimizer.run(&corpus()).await.expect("run should succeed");

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.completed_trials, 2);
    assert_eq!(outcome.run.failed_trials, 2);

    let failed: Vec<&TrialRecord> = outcome.trials.iter().filter(|t| !t.is_completed()).collect();
    assert_eq!(failed.len(), 2);
    for trial in failed {
        assert_eq!(trial.embedding_model, "broken");
        assert!(!trial.is_pareto);
        assert!(
            trial
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("model not loaded"))
        );
    }
    let recommended = outcome.recommended_trial().expect("should recommend");
    assert_eq!(recommended.embedding_model, "keyword");
}

#[tokio::test]
async fn run_fails_when_every_trial_fails() {
    let (_temp_dir, database) = database().await;
    let config = config(&["broken"]);
    let index = MemoryIndex::default();
    let optimizer = Optimizer::new(&config, &KeywordFactory, &index, &TopicChat, &database);

    let err = optimizer.run(&corpus()).await.expect_err("run should fail");
    assert!(err.to_string().contains("All 2 trials failed"));

    let run = database
        .latest_run()
        .await
        .expect("query should succeed")
        .expect("run should be stored");
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failed_trials, 2);
    assert!(run.error_message.is_some_and(|m| m.contains("All 2 trials failed")));
}

#[tokio::test]
async fn empty_corpus_is_rejected_before_a_run_starts() {
    let (_temp_dir, database) = database().await;
    let config = config(&["keyword"]);
    let index = MemoryIndex::default();
    let optimizer = Optimizer::new(&config, &KeywordFactory, &index, &TopicChat, &database);

    assert!(optimizer.run(&[]).await.is_err());
    assert!(
        database
            .latest_run()
            .await
            .expect("query should succeed")
            .is_none()
    );
}

#[test]
fn namespace_uses_short_run_id() {
    assert_eq!(
        trial_namespace("0123456789abcdef", 4),
        "trial-01234567-4"
    );
}
