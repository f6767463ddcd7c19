// Run reports
// Terminal table, JSON export and a standalone HTML page

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::database::models::{OptimizationRun, TrialRecord};

const RECOMMENDED_MARK: &str = "★";
const PARETO_MARK: &str = "◆";

/// A run together with its trials, in rank order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: OptimizationRun,
    pub trials: Vec<TrialRecord>,
}

impl RunReport {
    /// Sorts `trials`: recommendation, then Pareto trials, then the rest by accuracy
    #[inline]
    pub fn new(run: OptimizationRun, mut trials: Vec<TrialRecord>) -> Self {
        let recommended = run.recommended_trial;
        let tier = |t: &TrialRecord| {
            if Some(t.trial_index) == recommended {
                0
            } else if t.is_pareto {
                1
            } else if t.is_completed() {
                2
            } else {
                3
            }
        };
        trials.sort_by(|a, b| {
            tier(a)
                .cmp(&tier(b))
                .then_with(|| {
                    b.accuracy
                        .unwrap_or(f64::NEG_INFINITY)
                        .partial_cmp(&a.accuracy.unwrap_or(f64::NEG_INFINITY))
                        .unwrap_or(Ordering::Equal)
                })
                .then(a.trial_index.cmp(&b.trial_index))
        });
        Self { run, trials }
    }

    #[inline]
    pub fn recommended(&self) -> Option<&TrialRecord> {
        let index = self.run.recommended_trial?;
        self.trials.iter().find(|t| t.trial_index == index)
    }

    #[inline]
    pub fn pareto_count(&self) -> usize {
        self.trials.iter().filter(|t| t.is_pareto).count()
    }

    /// Fixed-width table for the terminal
    #[inline]
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "   {:>3}  {:>5}  {:>7}  {:<22}  {:>3}  {:<8}  {:>8}  {:>6}  {:>6}  {:>9}  {:>11}",
            "#", "chunk", "overlap", "model", "k", "prompt", "accuracy", "hit", "mrr", "latency", "cost/query"
        );
        for trial in &self.trials {
            let mark = self.mark(trial);
            let model = shorten(&trial.embedding_model, 22);
            match trial.metrics() {
                Some(m) => {
                    let _ = writeln!(
                        out,
                        "{:<2} {:>3}  {:>5}  {:>7}  {:<22}  {:>3}  {:<8}  {:>8.3}  {:>6.2}  {:>6.2}  {:>7.0}ms  {:>11}",
                        mark,
                        trial.trial_index,
                        trial.chunk_size,
                        trial.chunk_overlap,
                        model,
                        trial.top_k,
                        trial.prompt_template,
                        m.accuracy,
                        m.hit_rate,
                        m.mrr,
                        m.mean_latency_ms,
                        format_cost(m.cost_per_query)
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "{:<2} {:>3}  {:>5}  {:>7}  {:<22}  {:>3}  {:<8}  failed: {}",
                        mark,
                        trial.trial_index,
                        trial.chunk_size,
                        trial.chunk_overlap,
                        model,
                        trial.top_k,
                        trial.prompt_template,
                        trial.error_message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
        let _ = writeln!(
            out,
            "\n{RECOMMENDED_MARK} recommended   {PARETO_MARK} Pareto frontier ({} trials)",
            self.pareto_count()
        );
        out
    }

    /// Human-readable summary of the recommended configuration
    #[inline]
    pub fn recommendation_summary(&self) -> Option<String> {
        let trial = self.recommended()?;
        let metrics = trial.metrics()?;
        Some(format!(
            "Recommended configuration (trial {}):\n  \
             chunk size {} / overlap {}, embedding model {}, top-k {}, prompt '{}'\n  \
             accuracy {:.3}, hit rate {:.2}, MRR {:.2}, latency {:.0} ms (p95 {:.0} ms), cost {} per query",
            trial.trial_index,
            trial.chunk_size,
            trial.chunk_overlap,
            trial.embedding_model,
            trial.top_k,
            trial.prompt_template,
            metrics.accuracy,
            metrics.hit_rate,
            metrics.mrr,
            metrics.mean_latency_ms,
            metrics.p95_latency_ms,
            format_cost(metrics.cost_per_query)
        ))
    }

    #[inline]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize run report")
    }

    /// Self-contained HTML page; every stored string is escaped
    #[inline]
    pub fn render_html(&self) -> String {
        let run = &self.run;
        let mut rows = String::new();
        for trial in &self.trials {
            let class = if Some(trial.trial_index) == run.recommended_trial {
                "recommended"
            } else if trial.is_pareto {
                "pareto"
            } else {
                ""
            };
            let cells = match trial.metrics() {
                Some(m) => format!(
                    "<td>{:.3}</td><td>{:.2}</td><td>{:.2}</td><td>{:.0}</td><td>{:.0}</td><td>{}</td>",
                    m.accuracy,
                    m.hit_rate,
                    m.mrr,
                    m.mean_latency_ms,
                    m.p95_latency_ms,
                    format_cost(m.cost_per_query)
                ),
                None => format!(
                    "<td colspan=\"6\" class=\"error\">{}</td>",
                    escape_html(trial.error_message.as_deref().unwrap_or("failed"))
                ),
            };
            let _ = writeln!(
                rows,
                "<tr class=\"{class}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>{cells}</tr>",
                trial.trial_index,
                trial.chunk_size,
                trial.chunk_overlap,
                escape_html(&trial.embedding_model),
                trial.top_k,
                escape_html(&trial.prompt_template),
            );
        }

        let summary = self
            .recommendation_summary()
            .map(|s| format!("<pre class=\"summary\">{}</pre>", escape_html(&s)))
            .unwrap_or_default();
        let error = run
            .error_message
            .as_deref()
            .map(|e| format!("<p class=\"error\">{}</p>", escape_html(e)))
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>autorag run {id}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; color: #222; }}
table {{ border-collapse: collapse; }}
th, td {{ padding: 0.3rem 0.7rem; border-bottom: 1px solid #ddd; text-align: right; }}
tr.recommended {{ background: #fff3c4; font-weight: bold; }}
tr.pareto {{ background: #e6f2ff; }}
.error {{ color: #b00020; text-align: left; }}
.summary {{ background: #f6f6f6; padding: 1rem; }}
</style>
</head>
<body>
<h1>Optimization run {id}</h1>
<p>Status: {status} &middot; {completed} completed, {failed} failed of {total} trials &middot; {questions} questions over {documents} documents &middot; seed {seed}</p>
<p>Priorities: accuracy {pa}, cost {pc}, latency {pl}</p>
{error}{summary}
<table>
<thead><tr><th>#</th><th>chunk</th><th>overlap</th><th>model</th><th>k</th><th>prompt</th><th>accuracy</th><th>hit rate</th><th>MRR</th><th>latency ms</th><th>p95 ms</th><th>cost/query</th></tr></thead>
<tbody>
{rows}</tbody>
</table>
</body>
</html>
"#,
            id = escape_html(&run.id),
            status = run.status,
            completed = run.completed_trials,
            failed = run.failed_trials,
            total = run.total_trials,
            questions = run.num_questions,
            documents = run.num_documents,
            seed = run.seed,
            pa = run.priority_accuracy,
            pc = run.priority_cost,
            pl = run.priority_latency,
        )
    }

    /// Write the HTML report into `dir` as `run-{id}.html`
    #[inline]
    pub fn write_html(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create reports directory: {}", dir.display()))?;
        let path = dir.join(format!("run-{}.html", self.run.id));
        std::fs::write(&path, self.render_html())
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!("Wrote report to {}", path.display());
        Ok(path)
    }

    fn mark(&self, trial: &TrialRecord) -> &'static str {
        if Some(trial.trial_index) == self.run.recommended_trial {
            RECOMMENDED_MARK
        } else if trial.is_pareto {
            PARETO_MARK
        } else {
            ""
        }
    }
}

#[inline]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Dollar amount with enough precision for sub-cent costs
#[inline]
pub fn format_cost(dollars: f64) -> String {
    if dollars == 0.0 {
        "$0".to_string()
    } else if dollars >= 0.01 {
        format!("${dollars:.4}")
    } else {
        format!("${dollars:.6}")
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}
