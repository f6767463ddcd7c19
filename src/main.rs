use autorag::Result;
use autorag::commands::{init_config, optimize, show_results, show_status};
use autorag::config::DEFAULT_CONFIG_FILE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autorag")]
#[command(about = "Find the best RAG configuration for your documents")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the documents, run a demo query and sweep RAG configurations
    Optimize {
        /// Override the number of configurations to evaluate
        #[arg(short, long)]
        experiments: Option<u32>,
        /// Re-index without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Stop after the demo query
        #[arg(long)]
        skip_sweep: bool,
    },
    /// Show the trials of the latest (or a given) run
    Results {
        /// Run ID or unique ID prefix
        #[arg(long)]
        run: Option<String>,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
        /// Write an HTML report and print its path
        #[arg(long)]
        show_report: bool,
    },
    /// Show progress of the latest run
    Status,
    /// Write a configuration template
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            experiments,
            yes,
            skip_sweep,
        } => {
            optimize(&cli.config, experiments, yes, skip_sweep).await?;
        }
        Commands::Results {
            run,
            json,
            show_report,
        } => {
            show_results(&cli.config, run.as_deref(), json, show_report).await?;
        }
        Commands::Status => {
            show_status(&cli.config).await?;
        }
        Commands::Init { force } => {
            init_config(&cli.config, force)?;
        }
    }

    Ok(())
}
