//! CLI definition and command dispatch for ContextWeaver.
//!
//! The CLI is a thin layer: argument parsing, logging setup, and output
//! formatting. All behavior lives in `cw-core`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cw_core::{ScanOptions, WeaverConfig, WeaverEngine};

// ============================================================================
// CLI Definition
// ============================================================================

/// ContextWeaver - code-aware retrieval for language models
#[derive(Parser, Debug)]
#[command(name = "cw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "CONTEXTWEAVER_VERBOSE")]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true, env = "CONTEXTWEAVER_QUIET")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan and index a repository
    #[command(after_help = r#"EXAMPLES:
    # Index the current directory
    cw index

    # Index another project without the vector phase
    cw index ../service --no-vectors

    # Rebuild the index from scratch
    cw index --force
"#)]
    Index {
        /// Project root (default: current directory)
        path: Option<PathBuf>,

        /// Skip embedding and vector upserts
        #[arg(long)]
        no_vectors: bool,

        /// Truncate stores and reindex everything
        #[arg(long)]
        force: bool,

        /// Output the scan report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a context pack for a query
    #[command(after_help = r#"EXAMPLES:
    # Ask about the current project
    cw search "where are embeddings batched?"

    # Machine-readable output
    cw search "lock ttl" --json
"#)]
    Search {
        /// The query
        query: String,

        /// Project root (default: current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Output the full context pack as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index health for a project
    Status {
        /// Project root (default: current directory)
        path: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a project's index data
    Clear {
        /// Project root (default: current directory)
        path: Option<PathBuf>,
    },
}

// ============================================================================
// Dispatch
// ============================================================================

/// Parse args, set up logging, and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let engine = WeaverEngine::from_env(WeaverConfig::default())?;

    match cli.command {
        Command::Index {
            path,
            no_vectors,
            force,
            json,
        } => {
            let root = resolve_root(path)?;
            let opts = ScanOptions {
                vector_index: !no_vectors,
                force_reindex: force,
            };
            let report = engine.scan(&root, &opts)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let s = &report.stats;
                println!(
                    "project {}: +{} ~{} ={} -{} skipped {} errors {}",
                    report.project_id,
                    s.added,
                    s.modified,
                    s.unchanged,
                    s.deleted,
                    s.skipped,
                    s.errors
                );
                if let Some(v) = &report.vector {
                    println!(
                        "vectors: {} files indexed ({} chunks), {} removed",
                        v.indexed, v.chunks, v.removed
                    );
                }
                for error in &report.errors {
                    eprintln!("  {}: {}", error.path, error.message);
                }
            }
            Ok(())
        }

        Command::Search { query, path, json } => {
            let root = resolve_root(path)?;
            let pack = engine.build_context_pack(&root, &query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pack)?);
            } else {
                for file in &pack.files {
                    for segment in &file.segments {
                        println!(
                            "== {}:{}-{} ({:.3}) {}",
                            file.file_path,
                            segment.start_line,
                            segment.end_line,
                            segment.score,
                            segment.breadcrumb
                        );
                        println!("{}", segment.text);
                    }
                }
            }
            Ok(())
        }

        Command::Status { path, json } => {
            let root = resolve_root(path)?;
            let status = engine.status(&root)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("project {}", status.project_id);
                println!("  files: {}", status.files);
                println!("  chunk fts rows: {}", status.chunk_fts_rows);
                match status.vectors {
                    Some(count) => println!("  vectors: {count}"),
                    None => println!("  vectors: (not indexed)"),
                }
                println!("  pending vector rows: {}", status.pending_vector_rows);
                match status.embedding_dimensions {
                    Some(dims) => println!("  embedding dimensions: {dims}"),
                    None => println!("  embedding dimensions: (unset)"),
                }
                println!(
                    "  fts tokenizer: {}",
                    if status.trigram_fts { "trigram" } else { "unicode61" }
                );
            }
            Ok(())
        }

        Command::Clear { path } => {
            let root = resolve_root(path)?;
            engine.clear(&root)?;
            println!("cleared");
            Ok(())
        }
    }
}

fn resolve_root(path: Option<PathBuf>) -> Result<PathBuf> {
    Ok(match path {
        Some(path) => path,
        None => std::env::current_dir()?,
    })
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cw_core={default_level},cw_db={default_level},cw_model={default_level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
