use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    NewRun, NewTrial, OptimizationRun, QaPairRecord, RunStatus, TrialRecord,
};
use crate::database::sqlite::queries::{QaPairQueries, RunQueries, TrialQueries};
use crate::optimizer::QaPair;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite store for optimization runs and their trials
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    /// Open the store at `path`, creating its parent directory
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }

        Self::new(path).await
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    // Run operations
    #[inline]
    pub async fn create_run(&self, new_run: &NewRun) -> Result<OptimizationRun> {
        RunQueries::create(&self.pool, new_run).await
    }

    /// Exact id, or a unique id prefix as printed in tables
    #[inline]
    pub async fn find_run(&self, id_or_prefix: &str) -> Result<Option<OptimizationRun>> {
        if let Some(run) = RunQueries::get_by_id(&self.pool, id_or_prefix).await? {
            return Ok(Some(run));
        }
        let mut matches = RunQueries::find_by_prefix(&self.pool, id_or_prefix).await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => anyhow::bail!("Run id prefix '{}' is ambiguous ({} runs)", id_or_prefix, n),
        }
    }

    #[inline]
    pub async fn latest_run(&self) -> Result<Option<OptimizationRun>> {
        RunQueries::latest(&self.pool).await
    }

    #[inline]
    pub async fn set_question_count(&self, run_id: &str, questions: usize) -> Result<()> {
        RunQueries::set_question_count(&self.pool, run_id, questions).await
    }

    #[inline]
    pub async fn update_run_progress(
        &self,
        run_id: &str,
        completed: usize,
        failed: usize,
    ) -> Result<()> {
        RunQueries::update_progress(&self.pool, run_id, completed, failed).await
    }

    #[inline]
    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        recommended_trial: Option<usize>,
        error_message: Option<&str>,
    ) -> Result<Option<OptimizationRun>> {
        RunQueries::finish(&self.pool, run_id, status, recommended_trial, error_message).await
    }

    // Trial operations
    #[inline]
    pub async fn insert_trial(&self, trial: &NewTrial) -> Result<TrialRecord> {
        TrialQueries::insert(&self.pool, trial).await
    }

    #[inline]
    pub async fn trials_for_run(&self, run_id: &str) -> Result<Vec<TrialRecord>> {
        TrialQueries::list_for_run(&self.pool, run_id).await
    }

    #[inline]
    pub async fn best_trial(&self, run_id: &str) -> Result<Option<TrialRecord>> {
        TrialQueries::best_for_run(&self.pool, run_id).await
    }

    #[inline]
    pub async fn mark_pareto(&self, run_id: &str, trial_indices: &[usize]) -> Result<()> {
        TrialQueries::mark_pareto(&self.pool, run_id, trial_indices).await
    }

    // Test set operations
    #[inline]
    pub async fn insert_qa_pairs(&self, run_id: &str, pairs: &[QaPair]) -> Result<usize> {
        QaPairQueries::insert_batch(&self.pool, run_id, pairs).await
    }

    #[inline]
    pub async fn qa_pairs_for_run(&self, run_id: &str) -> Result<Vec<QaPairRecord>> {
        QaPairQueries::list_for_run(&self.pool, run_id).await
    }
}
