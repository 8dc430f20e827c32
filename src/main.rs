//! # NeuraShield CLI (`shield`)
//!
//! ## Usage
//!
//! ```bash
//! shield --config ./shield.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shield init` | Create the index directory and schema |
//! | `shield ingest <repo>` | Extract, chunk, embed and index a repository |
//! | `shield stats` | Record count, type distribution, top files |
//! | `shield search "<text>"` | Nearest indexed chunks for free text |
//! | `shield clear` | Drop every record in the collection |
//! | `shield context <file>` | Build the retrieval context for a file |
//! | `shield analyze <file>` | Bug / optimization / security analysis |
//! | `shield analyze-repo <repo>` | Analyze every file in a repository |
//! | `shield pr <files..>` | Analyze changed files, write a Markdown report |
//! | `shield gate <results.json>` | Exit 1 on critical findings |
//! | `shield dashboard` | Static HTML dashboard from a results file |
//! | `shield scan [files..]` | Regex pre-commit scan of staged files |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level);
//! command output goes to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use neurashield::config;
use neurashield::progress::ProgressMode;
use neurashield::{analyze, ci, ingest, precommit, search, stats};
use neurashield_core::models::{AnalysisType, ChunkKind};

/// NeuraShield: retrieval-augmented bug, optimization and security
/// analysis for Python repositories.
#[derive(Parser)]
#[command(name = "shield", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./shield.toml` when present, otherwise built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ingest progress on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index directory and schema. Idempotent.
    Init,

    /// Extract, chunk, embed and index a repository.
    Ingest {
        /// Git URL to clone, or a local directory to scan in place.
        repo: String,

        /// Show file, chunk and cost figures without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Also write the extracted records to this JSON file.
        #[arg(long)]
        save_extracted: Option<PathBuf>,
    },

    /// Show index statistics.
    Stats,

    /// Find indexed chunks similar to free text.
    Search {
        text: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict to `function`, `class` or `module` chunks.
        #[arg(long = "type", value_parser = parse_chunk_kind)]
        kind: Option<ChunkKind>,
    },

    /// Remove every record from the collection.
    Clear,

    /// Build the retrieval context for a file.
    Context {
        file: PathBuf,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long = "type", value_parser = parse_chunk_kind)]
        kind: Option<ChunkKind>,

        /// Save the context as JSON instead of printing it.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Analyze one file.
    Analyze {
        file: PathBuf,

        /// `bugs`, `optimization`, `security` or `all`.
        #[arg(long = "type", default_value = "all", value_parser = parse_analysis_type)]
        analysis_type: AnalysisType,

        /// Results JSON (defaults to `[output].analysis_results`).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Text report (defaults to `[output].analysis_report`).
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Extract a repository and analyze every file.
    AnalyzeRepo {
        repo: String,

        #[arg(long = "type", default_value = "all", value_parser = parse_analysis_type)]
        analysis_type: AnalysisType,
    },

    /// Analyze changed files of a pull request.
    Pr {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Exit 1 when a results file contains critical findings.
    Gate { results: PathBuf },

    /// Render the HTML dashboard from a results file.
    Dashboard {
        /// Defaults to `[output].pr_results`.
        #[arg(long)]
        results: Option<PathBuf>,

        /// Defaults to `[output].dashboard`.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Scan staged (or the given) Python files for risky patterns.
    Scan { files: Vec<String> },
}

fn parse_chunk_kind(s: &str) -> Result<ChunkKind, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn parse_analysis_type(s: &str) -> Result<AnalysisType, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

#[tokio::main]
async fn main() {
    init_tracing();

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            std::process::exit(1);
        }
    }
}

/// Run the parsed command. `Ok(false)` means the command completed but
/// reports failure (blocked gate or scan).
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    let load = || config::resolve_config(cli.config.as_deref());
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => stats::run_init(&load()?).await?,
        Commands::Ingest {
            repo,
            dry_run,
            save_extracted,
        } => {
            let reporter = progress.reporter();
            ingest::run_ingest(
                &load()?,
                &repo,
                dry_run,
                save_extracted.as_deref(),
                reporter.as_ref(),
            )
            .await?
        }
        Commands::Stats => stats::run_stats(&load()?).await?,
        Commands::Search { text, top_k, kind } => {
            search::run_search(&load()?, &text, top_k, kind).await?
        }
        Commands::Clear => stats::run_clear(&load()?).await?,
        Commands::Context {
            file,
            top_k,
            kind,
            out,
        } => analyze::run_context(&load()?, &file, top_k, kind, out.as_deref()).await?,
        Commands::Analyze {
            file,
            analysis_type,
            out,
            report,
        } => analyze::run_analyze(&load()?, &file, analysis_type, out, report).await?,
        Commands::AnalyzeRepo {
            repo,
            analysis_type,
        } => analyze::run_analyze_repo(&load()?, &repo, analysis_type).await?,
        Commands::Pr { files } => analyze::run_pr(&load()?, &files).await?,
        Commands::Gate { results } => return ci::run_gate(&results),
        Commands::Dashboard { results, out } => {
            let cfg = load()?;
            let results = results.unwrap_or(cfg.output.pr_results);
            let out = out.unwrap_or(cfg.output.dashboard);
            ci::run_dashboard(&results, &out)?
        }
        Commands::Scan { files } => return precommit::run_scan(&files),
    }
    Ok(true)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
