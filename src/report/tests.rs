use super::*;
use crate::database::models::{RunStatus, TrialStatus};
use chrono::NaiveDate;
use tempfile::TempDir;

fn run(recommended: Option<i64>) -> OptimizationRun {
    let started = NaiveDate::from_ymd_opt(2025, 5, 4)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .expect("valid timestamp");
    OptimizationRun {
        id: "5f0c1a2b-aaaa-bbbb-cccc-000000000000".to_string(),
        status: RunStatus::Completed,
        total_trials: 4,
        completed_trials: 3,
        failed_trials: 1,
        num_documents: 25,
        num_questions: 10,
        seed: 42,
        priority_accuracy: 0.6,
        priority_cost: 0.2,
        priority_latency: 0.2,
        recommended_trial: recommended,
        error_message: None,
        started_at: started,
        updated_at: started,
        finished_at: Some(started),
    }
}

fn trial(index: i64, accuracy: Option<f64>, is_pareto: bool) -> TrialRecord {
    let completed = accuracy.is_some();
    TrialRecord {
        id: index + 100,
        run_id: "run".to_string(),
        trial_index: index,
        chunk_size: 512,
        chunk_overlap: 50,
        embedding_model: "all-minilm:latest".to_string(),
        top_k: 5,
        prompt_template: "default".to_string(),
        status: if completed {
            TrialStatus::Completed
        } else {
            TrialStatus::Failed
        },
        accuracy,
        hit_rate: accuracy.map(|_| 0.9),
        mrr: accuracy.map(|_| 0.8),
        mean_latency_ms: accuracy.map(|_| 250.0),
        p95_latency_ms: accuracy.map(|_| 400.0),
        cost_per_query: accuracy.map(|_| 0.00012),
        indexing_cost: accuracy.map(|_| 0.0),
        num_chunks: accuracy.map(|_| 30),
        num_questions: accuracy.map(|_| 20),
        error_message: if completed {
            None
        } else {
            Some("<timeout> & retry".to_string())
        },
        is_pareto,
        duration_ms: 1000,
        created_at: run(None).started_at,
    }
}

fn report() -> RunReport {
    RunReport::new(
        run(Some(2)),
        vec![
            trial(0, Some(0.9), false),
            trial(1, None, false),
            trial(2, Some(0.5), true),
            trial(3, Some(0.7), true),
        ],
    )
}

#[test]
fn trials_are_ranked_recommendation_pareto_rest() {
    let order: Vec<i64> = report().trials.iter().map(|t| t.trial_index).collect();
    assert_eq!(order, vec![2, 3, 0, 1]);
}

#[test]
fn table_marks_recommended_and_pareto() {
    let table = report().render_table();
    let lines: Vec<&str> = table.lines().collect();

    assert!(lines[0].contains("accuracy"));
    assert!(lines[1].starts_with(RECOMMENDED_MARK));
    assert!(lines[2].starts_with(PARETO_MARK));
    assert!(lines[3].trim_start().starts_with('0'));
    assert!(lines[4].contains("failed: <timeout> & retry"));
    assert!(table.contains("Pareto frontier (2 trials)"));
}

#[test]
fn summary_describes_recommended_trial() {
    let summary = report().recommendation_summary().expect("should have a summary");
    assert!(summary.contains("trial 2"));
    assert!(summary.contains("chunk size 512 / overlap 50"));
    assert!(summary.contains("accuracy 0.500"));
    assert!(summary.contains("$0.000120"));

    let none = RunReport::new(run(None), vec![trial(0, Some(0.9), true)]);
    assert!(none.recommendation_summary().is_none());
}

#[test]
fn json_contains_run_and_trials() {
    let json = report().to_json().expect("should serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(value["run"]["status"], "completed");
    assert_eq!(value["run"]["recommended_trial"], 2);
    assert_eq!(value["trials"].as_array().map(Vec::len), Some(4));
    assert_eq!(value["trials"][3]["status"], "failed");
}

#[test]
fn html_is_escaped_and_self_contained() {
    let html = report().render_html();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("&lt;timeout&gt; &amp; retry"));
    assert!(!html.contains("<timeout>"));
    assert!(html.contains("<tr class=\"recommended\">"));
    assert!(html.contains("<style>"));
    assert!(!html.contains("<script"));
}

#[test]
fn html_is_written_under_run_id() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().join("reports");
    let path = report().write_html(&dir).expect("should write report");

    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("run-5f0c1a2b-aaaa-bbbb-cccc-000000000000.html")
    );
    let written = std::fs::read_to_string(&path).expect("report should exist");
    assert!(written.contains("Optimization run 5f0c1a2b"));
}

#[test]
fn helpers() {
    assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    assert_eq!(format_cost(0.0), "$0");
    assert_eq!(format_cost(0.25), "$0.2500");
    assert_eq!(format_cost(0.0000123), "$0.000012");
    assert_eq!(shorten("abcdef", 4), "abc…");
    assert_eq!(shorten("abc", 4), "abc");
}
