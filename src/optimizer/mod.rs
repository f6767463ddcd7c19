// Configuration sweep
// Generates a test set, evaluates each sampled configuration in its own
// namespace, then picks the Pareto-optimal recommendation

#[cfg(test)]
mod tests;

pub mod evaluation;
pub mod pareto;
pub mod search_space;
pub mod synthetic;

use anyhow::{Context, Result, anyhow, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::Database;
use crate::database::models::{NewRun, NewTrial, OptimizationRun, RunStatus, TrialRecord, short_id};
use crate::embeddings::{EmbedderFactory, estimate_token_count};
use crate::llm::ChatModel;
use crate::rag::{QueryOptions, RagPipeline};
use crate::sources::Document;
use crate::vector_store::{IndexTarget, VectorIndex};

pub use evaluation::{MetricsAccumulator, Pricing, QuestionOutcome, TrialMetrics};
pub use pareto::{Candidate, pareto_frontier, recommend};
pub use search_space::{TrialConfig, full_grid, select_trials};
pub use synthetic::{QaPair, generate_qa_pairs};

/// What a finished sweep produced
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub run: OptimizationRun,
    pub trials: Vec<TrialRecord>,
    pub frontier: Vec<usize>,
    pub recommended: Option<usize>,
}

impl OptimizationOutcome {
    #[inline]
    pub fn recommended_trial(&self) -> Option<&TrialRecord> {
        let index = i64::try_from(self.recommended?).ok()?;
        self.trials.iter().find(|t| t.trial_index == index)
    }
}

pub struct Optimizer<'a> {
    config: &'a Config,
    embedders: &'a dyn EmbedderFactory,
    index: &'a dyn VectorIndex,
    chat: &'a dyn ChatModel,
    database: &'a Database,
}

impl<'a> Optimizer<'a> {
    #[inline]
    pub fn new(
        config: &'a Config,
        embedders: &'a dyn EmbedderFactory,
        index: &'a dyn VectorIndex,
        chat: &'a dyn ChatModel,
        database: &'a Database,
    ) -> Self {
        Self {
            config,
            embedders,
            index,
            chat,
            database,
        }
    }

    /// Evaluate the sampled search space against `documents` and persist the results
    #[inline]
    pub async fn run(&self, documents: &[Document]) -> Result<OptimizationOutcome> {
        let settings = &self.config.optimization;
        if documents.is_empty() {
            bail!("No documents available to optimize against");
        }

        let trials = select_trials(
            &self.config.search_space,
            settings.num_experiments as usize,
            settings.seed,
        );
        if trials.is_empty() {
            bail!("Search space contains no valid configuration");
        }

        let run = self
            .database
            .create_run(&NewRun {
                id: Uuid::new_v4().to_string(),
                seed: settings.seed,
                priorities: settings.priorities,
                num_documents: documents.len(),
                total_trials: trials.len(),
            })
            .await?;
        info!(
            "Started run {} with {} trials over {} documents",
            run.id,
            trials.len(),
            documents.len()
        );

        match self.sweep(&run, documents, &trials).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Run {} failed: {:#}", run.id, e);
                self.database
                    .finish_run(&run.id, RunStatus::Failed, None, Some(&format!("{e:#}")))
                    .await?;
                Err(e)
            }
        }
    }

    async fn sweep(
        &self,
        run: &OptimizationRun,
        documents: &[Document],
        trials: &[TrialConfig],
    ) -> Result<OptimizationOutcome> {
        let settings = &self.config.optimization;

        let pairs = generate_qa_pairs(
            self.chat,
            documents,
            settings.test_questions as usize,
            settings.seed,
        )
        .context("Failed to generate the test set")?;
        self.database.insert_qa_pairs(&run.id, &pairs).await?;
        self.database.set_question_count(&run.id, pairs.len()).await?;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(trials.len() as u64).with_style(
                ProgressStyle::with_template("{bar:30} [{pos}/{len}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut candidates = Vec::new();
        let mut failed = 0usize;

        for (trial_index, trial) in trials.iter().enumerate() {
            bar.set_message(trial.label());
            let started = Instant::now();

            let outcome = self
                .evaluate_trial(&run.id, trial_index, trial, documents, &pairs)
                .await
                .map_err(|e| format!("{e:#}"));

            match &outcome {
                Ok(metrics) => {
                    info!(
                        "Trial {} ({}): accuracy {:.3}, {:.0} ms, ${:.6}/query",
                        trial_index,
                        trial.label(),
                        metrics.accuracy,
                        metrics.mean_latency_ms,
                        metrics.cost_per_query
                    );
                    candidates.push(Candidate::from_metrics(trial_index, metrics));
                }
                Err(message) => {
                    warn!("Trial {} ({}) failed: {}", trial_index, trial.label(), message);
                    failed += 1;
                }
            }

            self.database
                .insert_trial(&NewTrial {
                    run_id: run.id.clone(),
                    trial_index,
                    config: trial.clone(),
                    outcome,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                })
                .await?;
            self.database
                .update_run_progress(&run.id, candidates.len(), failed)
                .await?;
            bar.inc(1);
        }
        bar.finish_and_clear();

        if candidates.is_empty() {
            bail!("All {} trials failed", trials.len());
        }

        let frontier = pareto_frontier(&candidates);
        let recommended = recommend(&candidates, &settings.priorities);
        self.database.mark_pareto(&run.id, &frontier).await?;

        let run = self
            .database
            .finish_run(&run.id, RunStatus::Completed, recommended, None)
            .await?
            .ok_or_else(|| anyhow!("Run {} disappeared from the results store", run.id))?;
        let trials = self.database.trials_for_run(&run.id).await?;

        info!(
            "Run {} completed: {} succeeded, {} failed, {} on the Pareto frontier",
            run.id,
            candidates.len(),
            failed,
            frontier.len()
        );

        Ok(OptimizationOutcome {
            run,
            trials,
            frontier,
            recommended,
        })
    }

    async fn evaluate_trial(
        &self,
        run_id: &str,
        trial_index: usize,
        trial: &TrialConfig,
        documents: &[Document],
        pairs: &[QaPair],
    ) -> Result<TrialMetrics> {
        let embedder = self
            .embedders
            .embedder_for(&trial.embedding_model)
            .with_context(|| format!("Failed to load embedding model '{}'", trial.embedding_model))?;

        let sample = pairs
            .first()
            .map(|p| p.question.clone())
            .context("Test set is empty")?;
        let dimension = embedder
            .embed(&[sample])?
            .first()
            .map(Vec::len)
            .filter(|&d| d > 0)
            .with_context(|| format!("Model '{}' returned no embedding", trial.embedding_model))?;

        let target = IndexTarget::new(trial_namespace(run_id, trial_index), dimension);
        let pipeline = RagPipeline::new(embedder.as_ref(), self.index, self.chat);

        let result = self.measure(&pipeline, trial, &target, documents, pairs).await;

        if !self.config.optimization.keep_trial_vectors {
            if let Err(e) = pipeline.clear_index(&target).await {
                warn!("Failed to clear namespace '{}': {:#}", target.namespace, e);
            }
        }
        result
    }

    async fn measure(
        &self,
        pipeline: &RagPipeline<'_>,
        trial: &TrialConfig,
        target: &IndexTarget,
        documents: &[Document],
        pairs: &[QaPair],
    ) -> Result<TrialMetrics> {
        let chunking = trial.chunking();
        chunking.validate()?;

        let summary = pipeline.index_documents(documents, &chunking, target).await?;
        let pricing = Pricing::new(&self.config.llm, trial.embedding_cost_per_million);
        let options = QueryOptions {
            top_k: trial.top_k,
            temperature: self.config.llm.temperature,
            max_tokens: self.config.llm.max_tokens,
            template: trial.prompt_template,
        };

        let mut accumulator = MetricsAccumulator::new();
        for pair in pairs {
            let answer = pipeline
                .query(&pair.question, &options, target)
                .await
                .with_context(|| format!("Question failed: {}", pair.question))?;

            accumulator.record(QuestionOutcome {
                f1: evaluation::token_f1(&answer.answer, &pair.answer),
                rank: evaluation::retrieval_rank(&answer.retrieved, &pair.document_id),
                latency: answer.latency,
                cost: pricing.query_cost(&answer.usage, estimate_token_count(&pair.question)),
            });
        }

        Ok(accumulator.finish(pricing.embedding_cost(summary.tokens), summary.chunks))
    }
}

/// Vector namespace owned by one trial of one run
#[inline]
pub fn trial_namespace(run_id: &str, trial_index: usize) -> String {
    format!("trial-{}-{}", short_id(run_id), trial_index)
}
