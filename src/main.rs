//! # RAG Compliance CLI (`ragc`)
//!
//! Every command restores the indices persisted under `[storage].root`
//! before running, so documents ingested by earlier invocations can be
//! queried and compared directly.
//!
//! ## Usage
//!
//! ```bash
//! ragc --config ./ragc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragc ingest <file>` | Extract, chunk, embed, and persist a document |
//! | `ragc query <doc> "<text>"` | Semantic search in one document |
//! | `ragc batch-query "<text>" <doc>...` | Same query against several documents |
//! | `ragc list` | List indexed documents |
//! | `ragc summary <doc>` | Metadata and index statistics |
//! | `ragc tables <doc>` | Tables found at extraction time |
//! | `ragc delete <doc>` | Remove a document's index and metadata |
//! | `ragc load <doc> <path>` | Register an existing index artifact |
//! | `ragc rag-report <doc> "<q>"...` | Several queries against one document |
//! | `ragc compare <doc> --spec <file>` | Compliance check |
//! | `ragc compare-many <doc>... --spec <file>` | Compliance check across documents |
//! | `ragc report <doc> --spec <file>` | Rendered compliance report |
//! | `ragc serve` | Start the HTTP tool server |
//!
//! JSON goes to stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rag_compliance::compliance::CancelSignal;
use rag_compliance::config::{self, Config};
use rag_compliance::report::{self, ReportFormat};
use rag_compliance::server;
use rag_compliance::service::RagService;
use rag_compliance::specification::{load_specification, SpecificationInput};

/// Per-document semantic retrieval and specification compliance checking.
#[derive(Parser)]
#[command(name = "ragc", version)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply without one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a document file.
    Ingest {
        file: PathBuf,
        /// Registry name (defaults to the file stem).
        #[arg(long)]
        name: Option<String>,
    },

    /// Semantic search within one document.
    Query {
        document: String,
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Run one query against several documents.
    BatchQuery {
        query: String,
        #[arg(required = true)]
        documents: Vec<String>,
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },

    /// List indexed documents.
    List,

    /// Show metadata for one document.
    Summary { document: String },

    /// Show the tables extracted from one document.
    Tables { document: String },

    /// Delete a document's index and metadata.
    Delete { document: String },

    /// Register a previously persisted index artifact.
    Load { document: String, store_path: PathBuf },

    /// Run several queries against one document.
    RagReport {
        document: String,
        #[arg(required = true)]
        queries: Vec<String>,
    },

    /// Compare a document against a specification file.
    Compare {
        document: String,
        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Compare several documents against one specification file.
    CompareMany {
        #[arg(required = true)]
        documents: Vec<String>,
        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Compare a document and print a rendered report.
    Report {
        document: String,
        #[command(flatten)]
        spec: SpecArgs,
        /// text, json, or html.
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Start the HTTP tool server.
    Serve {
        /// Overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(clap::Args)]
struct SpecArgs {
    /// Requirement file: `.json` (list or object) or one requirement per line.
    #[arg(long)]
    spec: PathBuf,
    #[arg(long, default_value = "Specification")]
    spec_name: String,
    /// Similarity threshold (defaults to `[compliance].threshold`).
    #[arg(long)]
    threshold: Option<f32>,
}

impl SpecArgs {
    fn load(&self) -> anyhow::Result<SpecificationInput> {
        load_specification(&self.spec)
            .with_context(|| format!("Failed to load specification: {}", self.spec.display()))
    }

    fn threshold(&self, cfg: &Config) -> f32 {
        self.threshold.unwrap_or(cfg.compliance.threshold)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "rag_compliance=debug,ragc=debug"
    } else {
        "rag_compliance=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel signal that fires on ctrl-c.
fn ctrl_c_signal() -> CancelSignal {
    let (handle, signal) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            handle.cancel();
        }
    });
    signal
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => {
            let cfg = Config::default();
            cfg.validate()?;
            cfg
        }
    };

    let service = Arc::new(RagService::new(cfg.clone())?);
    service
        .restore()
        .await
        .context("Failed to restore persisted indices")?;

    match cli.command {
        Commands::Ingest { file, name } => {
            let outcome = service.ingest(&file, name.as_deref()).await;
            print_json(&outcome)?;
            if !outcome.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Query {
            document,
            query,
            top_k,
        } => {
            print_json(&service.query(&document, &query, top_k).await?)?;
        }
        Commands::BatchQuery {
            query,
            documents,
            top_k,
        } => {
            print_json(&service.batch_query(&documents, &query, top_k).await)?;
        }
        Commands::List => {
            print_json(&service.list())?;
        }
        Commands::Summary { document } => {
            print_json(&service.summary(&document)?)?;
        }
        Commands::Tables { document } => {
            print_json(&service.tables(&document)?)?;
        }
        Commands::Delete { document } => {
            print_json(&service.delete(&document).await?)?;
        }
        Commands::Load {
            document,
            store_path,
        } => {
            print_json(&service.load_existing(&document, &store_path).await?)?;
        }
        Commands::RagReport { document, queries } => {
            print_json(&service.rag_report(&document, &queries).await?)?;
        }
        Commands::Compare { document, spec } => {
            let result = service
                .compliance_engine()
                .compare(
                    &document,
                    &spec.load()?,
                    &spec.spec_name,
                    spec.threshold(&cfg),
                    &ctrl_c_signal(),
                )
                .await?;
            print_json(&result)?;
        }
        Commands::CompareMany { documents, spec } => {
            let results = service
                .compliance_engine()
                .compare_multiple(
                    &documents,
                    &spec.load()?,
                    &spec.spec_name,
                    spec.threshold(&cfg),
                    &ctrl_c_signal(),
                )
                .await?;
            print_json(&results)?;
        }
        Commands::Report {
            document,
            spec,
            format,
        } => {
            let format: ReportFormat = format.parse()?;
            let result = service
                .compliance_engine()
                .compare(
                    &document,
                    &spec.load()?,
                    &spec.spec_name,
                    spec.threshold(&cfg),
                    &ctrl_c_signal(),
                )
                .await?;
            print!("{}", report::render(&result, format)?);
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            server::run_server(service.clone(), &bind).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
