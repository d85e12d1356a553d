//! CLI parser and dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "doclens")]
#[command(about = "Document analysis pipeline: parse, chunk, analyze, integrate")]
#[command(version)]
pub struct Cli {
    /// Data directory for caches and artifacts (overrides config file).
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis pipeline on a document
    Analyze {
        /// Document to analyze
        file: PathBuf,
        /// Per-chunk token budget (overrides config)
        #[arg(short, long)]
        budget: Option<usize>,
        /// Concurrent provider calls (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Chunk even when the document fits the budget
        #[arg(long)]
        force_chunking: bool,
        /// Re-run parsing even when a cached arbitration exists
        #[arg(long)]
        reparse: bool,
        /// Re-run chunk analyses even when cached results exist
        #[arg(long)]
        reanalyze: bool,
        /// Disable the stage cache entirely
        #[arg(long)]
        no_cache: bool,
        /// Write the integrated result as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Run parser arbitration only and show the attempt table
    Parse {
        /// Document to parse
        file: PathBuf,
        /// Re-run parsing even when a cached arbitration exists
        #[arg(long)]
        reparse: bool,
    },

    /// Run chunking only and show the chunk boundaries
    Chunk {
        /// Document to chunk
        file: PathBuf,
        /// Per-chunk token budget (overrides config)
        #[arg(short, long)]
        budget: Option<usize>,
        /// Chunk even when the document fits the budget
        #[arg(long)]
        force_chunking: bool,
    },

    /// Check external tool and engine availability
    Check,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, mut config) = load_settings_with_options(LoadOptions {
        config_path: cli.config.clone(),
        data: cli.data.clone(),
    })
    .await;

    match cli.command {
        Commands::Analyze {
            file,
            budget,
            workers,
            force_chunking,
            reparse,
            reanalyze,
            no_cache,
            json,
        } => {
            if let Some(workers) = workers {
                config.analysis.workers = workers;
            }
            commands::cmd_analyze(
                &settings,
                &config,
                commands::AnalyzeArgs {
                    file,
                    budget,
                    force_chunking,
                    reparse,
                    reanalyze,
                    no_cache,
                    json,
                },
            )
            .await
        }
        Commands::Parse { file, reparse } => {
            commands::cmd_parse(&settings, &config, &file, reparse).await
        }
        Commands::Chunk {
            file,
            budget,
            force_chunking,
        } => commands::cmd_chunk(&settings, &config, &file, budget, force_chunking).await,
        Commands::Check => commands::cmd_check(&config).await,
    }
}
