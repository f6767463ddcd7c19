use anyhow::{Context, Result, bail};
use chrono::Utc;
use console::style;
use dialoguer::Confirm;
use std::path::Path;
use tracing::{info, warn};

use crate::AutoRagError;
use crate::config::{Config, DatabaseConfig, VectorBackend, mask_secret};
use crate::database::Database;
use crate::database::models::{OptimizationRun, RunStatus};
use crate::embeddings::{ChunkingConfig, OllamaClient};
use crate::llm::GroqClient;
use crate::optimizer::Optimizer;
use crate::rag::{QueryOptions, RagAnswer, RagPipeline};
use crate::report::{RunReport, format_cost};
use crate::sources;
use crate::vector_store::{self, IndexTarget};

/// Question asked against the freshly indexed corpus before the sweep
pub const DEMO_QUESTION: &str = "What is the main topic discussed in these documents?";
const DEMO_TOP_K: usize = 3;

/// Load the config, index the corpus, answer a demo question, then run the sweep
#[inline]
pub async fn optimize(
    config_path: &Path,
    experiments: Option<u32>,
    assume_yes: bool,
    skip_sweep: bool,
) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(experiments) = experiments {
        config.optimization.set_num_experiments(experiments)?;
    }
    print_config_summary(&config);

    // Data source
    let source = sources::connect(&config.database).await?;
    source
        .test_connection()
        .await
        .with_context(|| format!("Failed to connect to {}", source.name()))
        .map_err(stage_error(AutoRagError::Network))?;
    let total = source.count_documents().await?;
    let limit = u32::try_from(total)
        .unwrap_or(u32::MAX)
        .min(config.optimization.fetch_limit);
    println!("Found {} documents, fetching {}", total, limit);

    let documents = source.fetch_documents(limit).await?;
    if documents.is_empty() {
        bail!("No usable documents found in {}", source.name());
    }
    println!("{} Loaded {} documents", style("✓").green(), documents.len());

    // Pipeline
    let embedder = OllamaClient::new(&config.embedding)?;
    embedder
        .health_check()
        .context("Ollama is not reachable; start it with 'ollama serve'")
        .map_err(stage_error(AutoRagError::Embedding))?;
    let index = vector_store::open(&config).await?;
    let chat = GroqClient::new(&config.api_keys.groq, &config.llm)?;
    let pipeline = RagPipeline::new(&embedder, index.as_ref(), &chat);
    println!(
        "{} RAG pipeline ready ({} + {} + {})",
        style("✓").green(),
        config.embedding.model,
        index.name(),
        config.llm.model
    );

    let target = IndexTarget::new("", config.embedding.dimension as usize);
    let existing = pipeline
        .index_stats(&target)
        .await
        .map_err(stage_error(AutoRagError::VectorStore))?
        .namespace_count("");
    println!("Vector index currently holds {} vectors", existing);

    if should_index(existing, assume_yes)? {
        if existing > 0 {
            pipeline.clear_index(&target).await?;
            info!("Cleared {} existing vectors", existing);
        }
        let summary = pipeline
            .index_documents(&documents, &ChunkingConfig::default(), &target)
            .await?;
        println!(
            "{} Indexed {} documents as {} chunks",
            style("✓").green(),
            summary.documents,
            summary.chunks
        );
    } else {
        println!("Keeping the existing vectors");
    }

    // Demo query
    let options = QueryOptions {
        top_k: DEMO_TOP_K,
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
        ..QueryOptions::default()
    };
    let answer = pipeline
        .query(DEMO_QUESTION, &options, &target)
        .await
        .map_err(stage_error(AutoRagError::Llm))?;
    print_answer(DEMO_QUESTION, &answer);

    if skip_sweep {
        return Ok(());
    }

    // Sweep
    let database = Database::open(&config.results_database_path()?)
        .await
        .map_err(stage_error(AutoRagError::Database))?;
    println!();
    println!(
        "Starting optimization: up to {} configurations, {} test questions",
        config.optimization.num_experiments, config.optimization.test_questions
    );
    let outcome = Optimizer::new(&config, &embedder, index.as_ref(), &chat, &database)
        .run(&documents)
        .await
        .map_err(stage_error(AutoRagError::Optimization))?;

    let report = RunReport::new(outcome.run, outcome.trials);
    println!();
    println!("{}", report.render_table());
    if let Some(summary) = report.recommendation_summary() {
        println!("{}", style(summary).bold());
    }
    println!();
    println!(
        "Run ID: {}  (view again with 'autorag results --run {}')",
        report.run.id,
        report.run.short_id()
    );

    Ok(())
}

/// Fold a stage failure and its causes into one categorised error
fn stage_error(kind: fn(String) -> AutoRagError) -> impl FnOnce(anyhow::Error) -> AutoRagError {
    move |error| kind(format!("{error:#}"))
}

fn should_index(existing: u64, assume_yes: bool) -> Result<bool> {
    if existing == 0 || assume_yes {
        return Ok(true);
    }
    if !console::user_attended() {
        warn!("Index is not empty and no terminal is attached; pass --yes to re-index");
        return Ok(false);
    }
    let confirmed = Confirm::new()
        .with_prompt(format!(
            "The index already holds {existing} vectors. Clear it and re-index?"
        ))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn print_answer(question: &str, answer: &RagAnswer) {
    println!();
    println!("{} {}", style("Q:").bold(), question);
    println!("{} {}", style("A:").bold(), answer.answer);
    if !answer.sources.is_empty() {
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {}. [{}] (score {:.3}) {}",
                i + 1,
                source.document_id,
                source.score,
                source.text
            );
        }
    }
    println!(
        "({} tokens{}, {} ms)",
        answer.usage.total_tokens,
        if answer.usage_estimated { " estimated" } else { "" },
        answer.latency.as_millis()
    );
}

/// Print the loaded configuration with every secret masked
#[inline]
pub fn print_config_summary(config: &Config) {
    println!("{}", style("Configuration").bold());
    match &config.database {
        DatabaseConfig::Supabase(supabase) => {
            println!("  Database: supabase ({})", supabase.url.as_deref().unwrap_or("-"));
            println!(
                "    table: {}, key: {}",
                supabase.table,
                mask_secret(supabase.key.as_deref().unwrap_or_default())
            );
        }
        DatabaseConfig::Postgresql(postgres) => {
            println!(
                "  Database: postgresql ({}:{})",
                postgres.host.as_deref().unwrap_or("-"),
                postgres.port
            );
            println!("    table: {}", postgres.table);
        }
        DatabaseConfig::Mongodb(mongo) => {
            println!(
                "  Database: mongodb ({})",
                mongo.collection.as_deref().unwrap_or("-")
            );
        }
    }
    println!(
        "  LLM: {} (key: {})",
        config.llm.model,
        mask_secret(&config.api_keys.groq)
    );
    match config.vector_store.backend {
        VectorBackend::Pinecone => println!(
            "  Vector store: pinecone '{}' (key: {})",
            config.api_keys.pinecone_index,
            mask_secret(&config.api_keys.pinecone)
        ),
        VectorBackend::Lancedb => println!("  Vector store: lancedb (local)"),
    }
    println!(
        "  Embeddings: {} via {}:{}",
        config.embedding.model, config.embedding.host, config.embedding.port
    );
    println!(
        "  Optimization: {} experiments, {} test questions, seed {}",
        config.optimization.num_experiments,
        config.optimization.test_questions,
        config.optimization.seed
    );
    println!();
}

/// Show the trials of a stored run
#[inline]
pub async fn show_results(
    config_path: &Path,
    run_id: Option<&str>,
    json: bool,
    show_report: bool,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let database = Database::open(&config.results_database_path()?).await?;

    let run = match run_id {
        Some(id) => database
            .find_run(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Run not found: {}", id))?,
        None => {
            let Some(run) = database.latest_run().await? else {
                println!("No optimization runs found yet.");
                println!("Use 'autorag optimize' to start one.");
                return Ok(());
            };
            run
        }
    };

    let trials = database.trials_for_run(&run.id).await?;
    let report = RunReport::new(run, trials);

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_run_header(&report.run);
        if report.trials.is_empty() {
            println!("No trials recorded yet.");
        } else {
            println!("{}", report.render_table());
        }
        if let Some(summary) = report.recommendation_summary() {
            println!("{}", style(summary).bold());
        }
    }

    if show_report {
        let path = report.write_html(&config.reports_dir()?)?;
        if json {
            eprintln!("Report written to {}", path.display());
        } else {
            println!();
            println!("Report written to {}", style(path.display()).cyan());
        }
    }

    Ok(())
}

fn print_run_header(run: &OptimizationRun) {
    println!("Run {} ({})", run.id, run.status);
    println!(
        "  Started: {}  Trials: {} completed, {} failed of {}",
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.completed_trials,
        run.failed_trials,
        run.total_trials
    );
    if let Some(error) = &run.error_message {
        println!("  {} {}", style("Error:").red(), error);
    }
    println!();
}

/// Progress of the most recent run
#[inline]
pub async fn show_status(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let database = Database::open(&config.results_database_path()?).await?;

    let Some(run) = database.latest_run().await? else {
        println!("No optimization runs found yet.");
        println!("Use 'autorag optimize' to start one.");
        return Ok(());
    };

    let now = Utc::now().naive_utc();
    let status = match run.status {
        RunStatus::Running => style(run.status.to_string()).yellow(),
        RunStatus::Completed => style(run.status.to_string()).green(),
        RunStatus::Failed => style(run.status.to_string()).red(),
    };

    println!("Latest run: {}", run.id);
    println!("  Status: {}", status);
    println!(
        "  Progress: {}/{} trials ({:.0}%), {} failed",
        run.finished_trials(),
        run.total_trials,
        run.progress_percentage(),
        run.failed_trials
    );
    println!(
        "  Test set: {} questions over {} documents",
        run.num_questions, run.num_documents
    );
    println!("  Elapsed: {}", format_duration(run.elapsed(now)));
    if let Some(remaining) = run.estimated_remaining(now) {
        println!("  Estimated remaining: {}", format_duration(remaining));
    }
    println!(
        "  Last update: {}",
        run.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    match database.best_trial(&run.id).await? {
        Some(best) => {
            if let Some(metrics) = best.metrics() {
                println!(
                    "  Best so far: trial {} (chunk {} / overlap {}, {}, k={}, {}) accuracy {:.3}, {:.0} ms, {}/query",
                    best.trial_index,
                    best.chunk_size,
                    best.chunk_overlap,
                    best.embedding_model,
                    best.top_k,
                    best.prompt_template,
                    metrics.accuracy,
                    metrics.mean_latency_ms,
                    format_cost(metrics.cost_per_query)
                );
            }
        }
        None => println!("  Best so far: no completed trials yet"),
    }

    if let Some(error) = &run.error_message {
        println!("  {} {}", style("Error:").red(), error);
    }

    Ok(())
}

/// Render a duration as `1h 02m 03s`, dropping leading zero units
#[inline]
pub fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Write a commented configuration template
#[inline]
pub fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(config_path, Config::template_toml()?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!(
        "{} Wrote configuration template to {}",
        style("✓").green(),
        style(config_path.display()).cyan()
    );
    println!("Fill in your database credentials and API keys, then run 'autorag optimize'.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 05s");
        assert_eq!(format_duration(chrono::Duration::seconds(3723)), "1h 02m 03s");
        assert_eq!(format_duration(chrono::Duration::seconds(-3)), "0s");
    }

    #[test]
    fn init_writes_loadable_template() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let path = temp_dir.path().join("sub").join("autorag.toml");

        init_config(&path, false).expect("should write template");
        let config = Config::load(&path).expect("template should load");
        assert_eq!(config, Config::template());

        assert!(init_config(&path, false).is_err());
        init_config(&path, true).expect("force should overwrite");
    }

    #[test]
    fn stage_errors_keep_the_cause_chain() {
        let error = anyhow::anyhow!("connection refused").context("Failed to connect to supabase");
        let categorised = stage_error(AutoRagError::Network)(error);

        assert!(matches!(categorised, AutoRagError::Network(_)));
        assert_eq!(
            categorised.to_string(),
            "Network error: Failed to connect to supabase: connection refused"
        );
    }

    #[test]
    fn indexing_decision_without_terminal_prompt() {
        assert!(should_index(0, false).expect("empty index"));
        assert!(should_index(10, true).expect("assume yes"));
    }
}
