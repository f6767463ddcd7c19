// Answer scoring, retrieval metrics and cost accounting for a single trial


use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::llm::TokenUsage;
use crate::vector_store::RetrievalMatch;

static PUNCTUATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^\w\s]").ok());
static ARTICLES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(a|an|the)\b").ok());

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Lower-case, drop punctuation and articles, collapse whitespace
#[inline]
pub fn normalize_answer(text: &str) -> String {
    let mut normalized = text.to_lowercase();
    if let Some(re) = PUNCTUATION.as_ref() {
        normalized = re.replace_all(&normalized, " ").into_owned();
    }
    if let Some(re) = ARTICLES.as_ref() {
        normalized = re.replace_all(&normalized, " ").into_owned();
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token-overlap F1 between a predicted and a reference answer
#[inline]
pub fn token_f1(prediction: &str, reference: &str) -> f64 {
    let predicted = normalize_answer(prediction);
    let expected = normalize_answer(reference);
    let predicted: Vec<&str> = predicted.split_whitespace().collect();
    let expected: Vec<&str> = expected.split_whitespace().collect();

    if predicted.is_empty() && expected.is_empty() {
        return 1.0;
    }
    if predicted.is_empty() || expected.is_empty() {
        return 0.0;
    }

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for token in &expected {
        *remaining.entry(token).or_default() += 1;
    }
    let mut common = 0usize;
    for token in &predicted {
        match remaining.get_mut(token) {
            Some(count) if *count > 0 => {
                *count -= 1;
                common += 1;
            }
            _ => {}
        }
    }
    if common == 0 {
        return 0.0;
    }

    let precision = common as f64 / predicted.len() as f64;
    let recall = common as f64 / expected.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// 1-based rank of the first match from `document_id`
#[inline]
pub fn retrieval_rank(matches: &[RetrievalMatch], document_id: &str) -> Option<usize> {
    matches
        .iter()
        .position(|m| m.document_id == document_id)
        .map(|i| i + 1)
}

#[inline]
pub fn reciprocal_rank(rank: Option<usize>) -> f64 {
    rank.map_or(0.0, |r| 1.0 / r as f64)
}

/// Nearest-rank percentile of `values`; zero when empty
#[inline]
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    sorted.get(index).copied().unwrap_or(0.0)
}

/// Token prices used to turn usage into dollars
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub embedding_per_million: f64,
}

impl Pricing {
    #[inline]
    pub fn new(llm: &LlmConfig, embedding_per_million: f64) -> Self {
        Self {
            input_per_million: llm.input_cost_per_million,
            output_per_million: llm.output_cost_per_million,
            embedding_per_million,
        }
    }

    #[inline]
    pub fn query_cost(&self, usage: &TokenUsage, query_tokens: usize) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million
            + query_tokens as f64 * self.embedding_per_million)
            / TOKENS_PER_MILLION
    }

    #[inline]
    pub fn embedding_cost(&self, tokens: usize) -> f64 {
        tokens as f64 * self.embedding_per_million / TOKENS_PER_MILLION
    }
}

/// Aggregated quality, speed and cost figures of one trial
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialMetrics {
    /// Mean answer token F1
    pub accuracy: f64,
    pub hit_rate: f64,
    pub mrr: f64,
    pub mean_latency_ms: f64,
    pub p95_latency_ms: f64,
    /// Mean dollars per answered question
    pub cost_per_query: f64,
    /// Dollars spent embedding the corpus
    pub indexing_cost: f64,
    pub questions: usize,
    pub chunks: usize,
}

/// One evaluated question
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionOutcome {
    pub f1: f64,
    pub rank: Option<usize>,
    pub latency: Duration,
    pub cost: f64,
}

#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    outcomes: Vec<QuestionOutcome>,
}

impl MetricsAccumulator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, outcome: QuestionOutcome) {
        self.outcomes.push(outcome);
    }

    #[inline]
    pub fn finish(self, indexing_cost: f64, chunks: usize) -> TrialMetrics {
        let n = self.outcomes.len();
        if n == 0 {
            return TrialMetrics {
                indexing_cost,
                chunks,
                ..TrialMetrics::default()
            };
        }

        let count = n as f64;
        let mean = |f: fn(&QuestionOutcome) -> f64| self.outcomes.iter().map(f).sum::<f64>() / count;
        let latencies: Vec<f64> = self
            .outcomes
            .iter()
            .map(|o| o.latency.as_secs_f64() * 1000.0)
            .collect();

        TrialMetrics {
            accuracy: mean(|o| o.f1),
            hit_rate: mean(|o| if o.rank.is_some() { 1.0 } else { 0.0 }),
            mrr: mean(|o| reciprocal_rank(o.rank)),
            mean_latency_ms: latencies.iter().sum::<f64>() / count,
            p95_latency_ms: percentile(&latencies, 95.0),
            cost_per_query: mean(|o| o.cost),
            indexing_cost,
            questions: n,
            chunks,
        }
    }
}
