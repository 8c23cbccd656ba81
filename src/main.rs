//! # docvault CLI (`dv`)
//!
//! The `dv` binary drives the ingestion and retrieval pipeline. It provides
//! commands for database initialization, document ingestion, source
//! management, similarity search, and blob reconciliation.
//!
//! ## Usage
//!
//! ```bash
//! dv --config ./config/dv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dv init` | Create the SQLite database and run schema migrations |
//! | `dv ingest <file> --owner <id>` | Extract, chunk, embed, and store a document |
//! | `dv list --owner <id>` | List an owner's ingested sources |
//! | `dv delete <id> --owner <id>` | Delete a source, its chunks, and its stored bytes |
//! | `dv search "<query>"` | Rank stored chunks by similarity to the query |
//! | `dv lookup "<query>"` | Run the chat-tool lookup (never fails) |
//! | `dv reconcile` | Retry blob deletes recorded in the orphan ledger |
//!
//! Credentials come from the environment: `OPENAI_API_KEY` for embeddings,
//! `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` for object storage.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docvault::config::{load_config, Config};
use docvault::db;
use docvault::embedding::OpenAiEmbedder;
use docvault::extract::detect_mime_type;
use docvault::ingest::Pipeline;
use docvault::migrate;
use docvault::object_store::S3ObjectStore;
use docvault::search::knowledge_base_lookup;
use docvault::store::{SqliteStore, Store};

/// docvault CLI — owner-scoped document ingestion and semantic retrieval
/// for RAG assistants.
#[derive(Parser)]
#[command(
    name = "dv",
    about = "docvault — document ingestion and semantic retrieval for RAG assistants",
    version,
    long_about = "docvault ingests uploaded documents (PDF, plain text), chunks and embeds \
    their text, and serves vector similarity search over the stored chunks. Database, \
    object-store, embedding, and chunking settings are read from a TOML config file."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (sources,
    /// chunks, orphaned_blobs). Idempotent — running it again is safe.
    Init,

    /// Ingest one document for an owner.
    ///
    /// Extracts text, checks for a duplicate upload, stores the raw bytes,
    /// chunks and embeds the text, and writes the source with its chunks.
    Ingest {
        /// Path to the document (.pdf, .md, or plain text).
        file: PathBuf,

        /// Owner id the source belongs to.
        #[arg(long)]
        owner: i64,

        /// Display name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// List an owner's ingested sources.
    List {
        #[arg(long)]
        owner: i64,
    },

    /// Delete a source, its chunks, and its stored bytes.
    Delete {
        /// Source id to delete.
        source_id: i64,

        /// Owner id the source must belong to.
        #[arg(long)]
        owner: i64,
    },

    /// Rank stored chunks by similarity to a query.
    Search {
        query: String,

        /// Maximum number of hits.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity score in [0, 1]; hits must exceed it.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run the chat-tool knowledge-base lookup.
    Lookup { query: String },

    /// Retry blob deletes recorded in the orphan ledger.
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { file, owner, name } => run_ingest(&config, &file, owner, name).await,
        Commands::List { owner } => run_list(&config, owner).await,
        Commands::Delete { source_id, owner } => run_delete(&config, source_id, owner).await,
        Commands::Search {
            query,
            limit,
            threshold,
        } => run_search(&config, &query, limit, threshold).await,
        Commands::Lookup { query } => run_lookup(&config, &query).await,
        Commands::Reconcile => run_reconcile(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(&config.db.path).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn build_pipeline(config: &Config, store: Arc<SqliteStore>) -> Result<Pipeline> {
    let objects = Arc::new(S3ObjectStore::new(&config.storage)?);
    let embedder = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    Ok(Pipeline::new(
        store,
        objects,
        embedder,
        config.chunking.clone(),
    ))
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    println!("database initialized at {}", config.db.path.display());
    pool.close().await;
    Ok(())
}

async fn run_ingest(
    config: &Config,
    file: &PathBuf,
    owner: i64,
    name: Option<String>,
) -> Result<()> {
    let raw_bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let file_name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    });
    let mime_type = detect_mime_type(&file_name);

    let store = open_store(config).await?;
    let pipeline = build_pipeline(config, store)?;

    let receipt = pipeline.ingest(owner, &raw_bytes, &file_name, mime_type).await?;

    println!("ingested {}", file_name);
    println!("  source id: {}", receipt.source_id);
    println!("  chunks: {}", receipt.chunk_count);
    Ok(())
}

async fn run_list(config: &Config, owner: i64) -> Result<()> {
    let store = open_store(config).await?;
    let sources = store.list_sources(owner).await?;

    if sources.is_empty() {
        println!("No sources.");
        return Ok(());
    }

    println!("{:<6} {:<40} {:<12} {:<10} UPLOADED", "ID", "NAME", "TYPE", "SIZE");
    for source in sources {
        let date = chrono::DateTime::from_timestamp(source.uploaded_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:<6} {:<40} {:<12} {:<10} {}",
            source.id, source.name, source.mime_type, source.file_size, date
        );
    }
    Ok(())
}

async fn run_delete(config: &Config, source_id: i64, owner: i64) -> Result<()> {
    let store = open_store(config).await?;
    let pipeline = build_pipeline(config, store)?;

    pipeline.delete_source(owner, source_id).await?;
    println!("deleted source {}", source_id);
    Ok(())
}

async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
) -> Result<()> {
    let store = open_store(config).await?;
    let pipeline = build_pipeline(config, store)?;

    let limit = limit.unwrap_or(config.search.default_limit);
    let threshold = threshold.unwrap_or(config.search.default_threshold);
    let hits = pipeline.search(query, limit, threshold).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.source_name);
        println!("    url: {}", hit.source_ref);
        println!(
            "    excerpt: \"{}\"",
            hit.content.chars().take(240).collect::<String>().replace('\n', " ")
        );
        println!("    chunk id: {}", hit.chunk_id);
        println!();
    }
    Ok(())
}

async fn run_lookup(config: &Config, query: &str) -> Result<()> {
    let store = open_store(config).await?;
    let pipeline = build_pipeline(config, store)?;

    let response = knowledge_base_lookup(&pipeline, query).await;
    println!("{}", response.content);
    if !response.sources.is_empty() {
        println!();
        for source in &response.sources {
            println!("source: {} ({})", source.title, source.url);
        }
    }
    Ok(())
}

async fn run_reconcile(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let pipeline = build_pipeline(config, store)?;

    let cleared = pipeline.reconcile_blobs().await?;
    println!("reconciled {} orphaned blob(s)", cleared);
    Ok(())
}
