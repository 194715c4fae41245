//! # Hybrid Retrieval Engine
//!
//! A hybrid vector + BM25 + property-graph document retrieval engine.
//!
//! ## Architecture
//!
//! ```text
//! Connector → Convert → Chunk+Enrich → Vector/Graph/Full-text stores → Composer → CLI / HTTP
//! ```
//!
//! ## Modules
//!
//! See [`hre_core`] for the full module index.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hre_core::engine;
use hre_core::progress::ProgressMode;

#[derive(Parser)]
#[command(
    name = "hre",
    about = "Hybrid retrieval engine — vector + BM25 + property-graph search, fused",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/hre.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the ambient SQLite schema
    Init,

    /// Show configured source health and status
    Sources,

    /// Ingest from the configured source and wait for completion
    Ingest {
        /// Suppress progress output
        #[arg(long)]
        quiet: bool,

        /// Emit machine-readable JSON progress instead of human text
        #[arg(long)]
        json: bool,
    },

    /// Ingest a single block of pasted text
    IngestText {
        /// Text content to ingest
        content: String,

        /// Optional source name for the synthetic document
        #[arg(long)]
        source_name: Option<String>,
    },

    /// Fused hybrid search
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },

    /// Fused hybrid search with an LLM-generated answer
    Query {
        /// Search query
        query: String,

        /// Maximum number of results to ground the answer in
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },

    /// Inspect or cancel background ingestion jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Start the HTTP server
    Serve,
}

#[derive(Subcommand)]
enum JobsAction {
    /// Show a job's current status
    Status {
        /// Job id
        job_id: String,
    },
    /// Request cancellation of a running job
    Cancel {
        /// Job id
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let config = hre_core::config::load_config(&cli.config)?;
            let pool = hre_core::db::connect(&config).await?;
            hre_core::migrate::run_migrations_on(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            let config = hre_core::config::load_config(&cli.config)?;
            hre_core::sources::list_sources(&config)?;
        }
        Commands::Ingest { quiet, json } => {
            let engine = engine::bootstrap(&cli.config).await?;
            let job_id = hre_core::ingest::start_ingestion(engine.clone()).await?;

            let mode = if quiet {
                ProgressMode::Off
            } else if json {
                ProgressMode::Json
            } else {
                ProgressMode::default_for_tty()
            };
            let reporter = mode.reporter();
            let job = hre_core::progress::watch_job(&engine.registry, &job_id, reporter.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::IngestText { content, source_name } => {
            let engine = engine::bootstrap(&cli.config).await?;
            let item = hre_core::ingest::synthetic_text_item(&content, source_name.as_deref());
            let job_id = hre_core::ingest::start_ingestion_with_items(engine.clone(), vec![item]).await?;
            let reporter = ProgressMode::Off.reporter();
            let job = hre_core::progress::watch_job(&engine.registry, &job_id, reporter.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Search { query, top_k } => {
            let engine = engine::bootstrap(&cli.config).await?;
            let composer = engine.composer.read().await;
            let results = composer.search(&query, top_k).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Query { query, top_k } => {
            let engine = engine::bootstrap(&cli.config).await?;
            let composer = engine.composer.read().await;
            let answer = composer.query(&query, top_k, &engine.config.llm).await?;
            println!("{answer}");
        }
        Commands::Jobs { action } => {
            let engine = engine::bootstrap(&cli.config).await?;
            match action {
                JobsAction::Status { job_id } => {
                    let job = engine.registry.get(&job_id).await?;
                    println!("{}", serde_json::to_string_pretty(&job)?);
                }
                JobsAction::Cancel { job_id } => {
                    let message = engine.registry.cancel(&job_id).await?;
                    println!("{message}");
                }
            }
        }
        Commands::Serve => {
            let engine = engine::bootstrap(&cli.config).await?;
            hre_core::server::run_server(engine).await?;
        }
    }

    Ok(())
}
