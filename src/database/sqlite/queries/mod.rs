
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::optimizer::QaPair;

const RUN_COLUMNS: &str = "id, status, total_trials, completed_trials, failed_trials, \
     num_documents, num_questions, seed, priority_accuracy, priority_cost, priority_latency, \
     recommended_trial, error_message, started_at, updated_at, finished_at";

const TRIAL_COLUMNS: &str = "id, run_id, trial_index, chunk_size, chunk_overlap, \
     embedding_model, top_k, prompt_template, status, accuracy, hit_rate, mrr, \
     mean_latency_ms, p95_latency_ms, cost_per_query, indexing_cost, num_chunks, \
     num_questions, error_message, is_pareto, duration_ms, created_at";

pub struct RunQueries;

impl RunQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_run: &NewRun) -> Result<OptimizationRun> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO runs (id, status, total_trials, num_documents, seed,
                              priority_accuracy, priority_cost, priority_latency,
                              started_at, updated_at)
            VALUES (?, 'running', ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_run.id)
        .bind(i64::try_from(new_run.total_trials)?)
        .bind(i64::try_from(new_run.num_documents)?)
        // SQLite integers are signed; seeds above i64::MAX wrap
        .bind(new_run.seed as i64)
        .bind(new_run.priorities.accuracy)
        .bind(new_run.priorities.cost)
        .bind(new_run.priorities.latency)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create run")?;

        Self::get_by_id(pool, &new_run.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created run"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<OptimizationRun>> {
        let run = sqlx::query_as::<_, OptimizationRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get run by id")?;

        Ok(run)
    }

    /// Runs whose id starts with `prefix`, newest first
    #[inline]
    pub async fn find_by_prefix(pool: &SqlitePool, prefix: &str) -> Result<Vec<OptimizationRun>> {
        let pattern = format!("{}%", prefix.replace(['%', '_'], ""));
        let runs = sqlx::query_as::<_, OptimizationRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE id LIKE ? ORDER BY started_at DESC, rowid DESC"
        ))
        .bind(pattern)
        .fetch_all(pool)
        .await
        .context("Failed to search runs by id prefix")?;

        Ok(runs)
    }

    #[inline]
    pub async fn latest(pool: &SqlitePool) -> Result<Option<OptimizationRun>> {
        let run = sqlx::query_as::<_, OptimizationRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY started_at DESC, rowid DESC LIMIT 1"
        ))
        .fetch_optional(pool)
        .await
        .context("Failed to get latest run")?;

        Ok(run)
    }

    #[inline]
    pub async fn set_question_count(pool: &SqlitePool, id: &str, questions: usize) -> Result<()> {
        sqlx::query("UPDATE runs SET num_questions = ?, updated_at = ? WHERE id = ?")
            .bind(i64::try_from(questions)?)
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update question count")?;
        Ok(())
    }

    #[inline]
    pub async fn update_progress(
        pool: &SqlitePool,
        id: &str,
        completed: usize,
        failed: usize,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE runs SET completed_trials = ?, failed_trials = ?, updated_at = ? WHERE id = ?",
        )
        .bind(i64::try_from(completed)?)
        .bind(i64::try_from(failed)?)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update run progress")?;

        debug!("Run {}: {} completed, {} failed", id, completed, failed);
        Ok(())
    }

    #[inline]
    pub async fn finish(
        pool: &SqlitePool,
        id: &str,
        status: RunStatus,
        recommended_trial: Option<usize>,
        error_message: Option<&str>,
    ) -> Result<Option<OptimizationRun>> {
        let now = Utc::now().naive_utc();
        let recommended = recommended_trial.map(i64::try_from).transpose()?;
        sqlx::query(
            r#"
            UPDATE runs
            SET status = ?, recommended_trial = ?, error_message = ?,
                updated_at = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(recommended)
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to finish run")?;

        Self::get_by_id(pool, id).await
    }
}

pub struct TrialQueries;

impl TrialQueries {
    #[inline]
    pub async fn insert(pool: &SqlitePool, trial: &NewTrial) -> Result<TrialRecord> {
        let (status, metrics, error_message) = match &trial.outcome {
            Ok(metrics) => (TrialStatus::Completed, Some(metrics), None),
            Err(message) => (TrialStatus::Failed, None, Some(message.as_str())),
        };
        let config = &trial.config;

        let id = sqlx::query(
            r#"
            INSERT INTO trials (run_id, trial_index, chunk_size, chunk_overlap, embedding_model,
                                top_k, prompt_template, status, accuracy, hit_rate, mrr,
                                mean_latency_ms, p95_latency_ms, cost_per_query, indexing_cost,
                                num_chunks, num_questions, error_message, duration_ms,
                                created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trial.run_id)
        .bind(i64::try_from(trial.trial_index)?)
        .bind(i64::try_from(config.chunk_size)?)
        .bind(i64::try_from(config.chunk_overlap)?)
        .bind(&config.embedding_model)
        .bind(i64::try_from(config.top_k)?)
        .bind(config.prompt_template.as_str())
        .bind(status)
        .bind(metrics.map(|m| m.accuracy))
        .bind(metrics.map(|m| m.hit_rate))
        .bind(metrics.map(|m| m.mrr))
        .bind(metrics.map(|m| m.mean_latency_ms))
        .bind(metrics.map(|m| m.p95_latency_ms))
        .bind(metrics.map(|m| m.cost_per_query))
        .bind(metrics.map(|m| m.indexing_cost))
        .bind(metrics.map(|m| m.chunks).map(i64::try_from).transpose()?)
        .bind(metrics.map(|m| m.questions).map(i64::try_from).transpose()?)
        .bind(error_message)
        .bind(i64::try_from(trial.duration_ms)?)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await
        .with_context(|| format!("Failed to store trial {}", trial.trial_index))?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve stored trial"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<TrialRecord>> {
        let trial = sqlx::query_as::<_, TrialRecord>(&format!(
            "SELECT {TRIAL_COLUMNS} FROM trials WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get trial by id")?;

        Ok(trial)
    }

    #[inline]
    pub async fn list_for_run(pool: &SqlitePool, run_id: &str) -> Result<Vec<TrialRecord>> {
        let trials = sqlx::query_as::<_, TrialRecord>(&format!(
            "SELECT {TRIAL_COLUMNS} FROM trials WHERE run_id = ? ORDER BY trial_index"
        ))
        .bind(run_id)
        .fetch_all(pool)
        .await
        .context("Failed to list trials")?;

        Ok(trials)
    }

    /// Most accurate completed trial so far
    #[inline]
    pub async fn best_for_run(pool: &SqlitePool, run_id: &str) -> Result<Option<TrialRecord>> {
        let trial = sqlx::query_as::<_, TrialRecord>(&format!(
            "SELECT {TRIAL_COLUMNS} FROM trials \
             WHERE run_id = ? AND status = 'completed' \
             ORDER BY accuracy DESC, trial_index ASC LIMIT 1"
        ))
        .bind(run_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get best trial")?;

        Ok(trial)
    }

    /// Flag exactly `trial_indices` as the run's Pareto frontier
    #[inline]
    pub async fn mark_pareto(pool: &SqlitePool, run_id: &str, trial_indices: &[usize]) -> Result<()> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for Pareto update")?;

        sqlx::query("UPDATE trials SET is_pareto = 0 WHERE run_id = ?")
            .bind(run_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to reset Pareto flags")?;

        for &index in trial_indices {
            sqlx::query("UPDATE trials SET is_pareto = 1 WHERE run_id = ? AND trial_index = ?")
                .bind(run_id)
                .bind(i64::try_from(index)?)
                .execute(&mut *transaction)
                .await
                .context("Failed to flag Pareto trial")?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit Pareto update")?;

        debug!("Run {}: {} Pareto trials", run_id, trial_indices.len());
        Ok(())
    }
}

pub struct QaPairQueries;

impl QaPairQueries {
    #[inline]
    pub async fn insert_batch(pool: &SqlitePool, run_id: &str, pairs: &[QaPair]) -> Result<usize> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for test set insert")?;

        for pair in pairs {
            sqlx::query(
                "INSERT INTO qa_pairs (run_id, question, answer, document_id) VALUES (?, ?, ?, ?)",
            )
            .bind(run_id)
            .bind(&pair.question)
            .bind(&pair.answer)
            .bind(&pair.document_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to insert test question")?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit test set insert")?;

        debug!("Stored {} test questions for run {}", pairs.len(), run_id);
        Ok(pairs.len())
    }

    #[inline]
    pub async fn list_for_run(pool: &SqlitePool, run_id: &str) -> Result<Vec<QaPairRecord>> {
        let pairs = sqlx::query_as::<_, QaPairRecord>(
            "SELECT id, run_id, question, answer, document_id FROM qa_pairs WHERE run_id = ? ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(pool)
        .await
        .context("Failed to list test questions")?;

        Ok(pairs)
    }
}
