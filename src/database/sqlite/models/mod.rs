
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::config::Priorities;
use crate::optimizer::{TrialConfig, TrialMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OptimizationRun {
    pub id: String,
    pub status: RunStatus,
    pub total_trials: i64,
    pub completed_trials: i64,
    pub failed_trials: i64,
    pub num_documents: i64,
    pub num_questions: i64,
    pub seed: i64,
    pub priority_accuracy: f64,
    pub priority_cost: f64,
    pub priority_latency: f64,
    pub recommended_trial: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Completed => write!(f, "Completed"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub id: String,
    pub seed: u64,
    pub priorities: Priorities,
    pub num_documents: usize,
    pub total_trials: usize,
}

impl OptimizationRun {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Trials finished either way
    #[inline]
    pub fn finished_trials(&self) -> i64 {
        self.completed_trials + self.failed_trials
    }

    #[inline]
    pub fn progress_percentage(&self) -> f64 {
        if self.total_trials <= 0 {
            return 0.0;
        }
        (self.finished_trials() as f64 / self.total_trials as f64 * 100.0).min(100.0)
    }

    /// Time from start until `now`, or until the run finished
    #[inline]
    pub fn elapsed(&self, now: NaiveDateTime) -> Duration {
        self.finished_at.unwrap_or(now) - self.started_at
    }

    /// Linear extrapolation from the trials finished so far
    #[inline]
    pub fn estimated_remaining(&self, now: NaiveDateTime) -> Option<Duration> {
        let done = self.finished_trials();
        if !self.is_running() || done <= 0 {
            return None;
        }
        let remaining = (self.total_trials - done).max(0);
        let per_trial = self.elapsed(now) / i32::try_from(done).ok()?;
        Some(per_trial * i32::try_from(remaining).ok()?)
    }

    #[inline]
    pub fn priorities(&self) -> Priorities {
        Priorities {
            accuracy: self.priority_accuracy,
            cost: self.priority_cost,
            latency: self.priority_latency,
        }
    }

    /// First eight characters of the id, used in namespaces and file names
    #[inline]
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

#[inline]
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for TrialStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            TrialStatus::Completed => write!(f, "Completed"),
            TrialStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrialRecord {
    pub id: i64,
    pub run_id: String,
    pub trial_index: i64,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub embedding_model: String,
    pub top_k: i64,
    pub prompt_template: String,
    pub status: TrialStatus,
    pub accuracy: Option<f64>,
    pub hit_rate: Option<f64>,
    pub mrr: Option<f64>,
    pub mean_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub cost_per_query: Option<f64>,
    pub indexing_cost: Option<f64>,
    pub num_chunks: Option<i64>,
    pub num_questions: Option<i64>,
    pub error_message: Option<String>,
    pub is_pareto: bool,
    pub duration_ms: i64,
    pub created_at: NaiveDateTime,
}

impl TrialRecord {
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }

    /// Stored metrics; `None` for failed trials
    #[inline]
    pub fn metrics(&self) -> Option<TrialMetrics> {
        if !self.is_completed() {
            return None;
        }
        Some(TrialMetrics {
            accuracy: self.accuracy?,
            hit_rate: self.hit_rate?,
            mrr: self.mrr?,
            mean_latency_ms: self.mean_latency_ms?,
            p95_latency_ms: self.p95_latency_ms?,
            cost_per_query: self.cost_per_query?,
            indexing_cost: self.indexing_cost?,
            questions: usize::try_from(self.num_questions?).ok()?,
            chunks: usize::try_from(self.num_chunks?).ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrial {
    pub run_id: String,
    pub trial_index: usize,
    pub config: TrialConfig,
    /// `Ok` with metrics, or the failure message
    pub outcome: Result<TrialMetrics, String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QaPairRecord {
    pub id: i64,
    pub run_id: String,
    pub question: String,
    pub answer: String,
    pub document_id: String,
}
