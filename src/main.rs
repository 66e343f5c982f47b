//! # Corpus Harness CLI (`corpus`)
//!
//! The `corpus` binary drives the ingestion and retrieval pipeline.
//!
//! ## Usage
//!
//! ```bash
//! corpus --config ./config/corpus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corpus init` | Create the SQLite database and run schema migrations |
//! | `corpus authors` | List the author folders under the library root |
//! | `corpus ingest <author>` | Chunk, embed, and store one author's corpus |
//! | `corpus positions <file>` | Import a structured positions file |
//! | `corpus search "<query>"` | Ranked retrieval (vector or keyword mode) |
//! | `corpus audit "<query>"` | Audited staged retrieval with exportable trace |
//! | `corpus stats` | Database statistics |
//! | `corpus clear <author>` | Delete an author's stored corpus |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! corpus init
//!
//! # Ingest the hume/ folder of the library (resumable; re-running is a no-op)
//! corpus ingest hume --domain empiricism
//!
//! # Import extracted positions
//! corpus positions ./imports/hume_positions.json --author hume
//!
//! # Vector search
//! corpus search "the self is a bundle of perceptions" --author hume --mode vector
//!
//! # Audited retrieval, report written as JSON
//! corpus audit "what is causation" --author hume --format json --output audit.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use corpus_harness::progress::ProgressMode;
use corpus_harness::store::VectorStore;
use corpus_harness::{
    config, corpus, db, export, ingest, migrate, positions, retrieve, search, stats,
    store::SqliteStore,
};

/// Corpus Harness — a corpus ingestion and semantic retrieval pipeline
/// for plain-text collections.
#[derive(Parser)]
#[command(
    name = "corpus",
    about = "Corpus Harness — corpus ingestion and semantic retrieval pipeline",
    version,
    long_about = "Corpus Harness ingests per-author text collections (chunking, embedding, \
    resumable storage in SQLite) and serves multi-signal retrieval over them: vector \
    similarity, keyword relevance, and an audited staged search that records every \
    accept/reject decision for export."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/corpus.toml")]
    config: PathBuf,

    /// Progress reporting on stderr: auto, off, human, or json.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and the passages/positions tables with
    /// their uniqueness constraints. Idempotent.
    Init,

    /// List the author folders available under the library root.
    Authors,

    /// Ingest one author's corpus folder.
    ///
    /// Scans `<library.root>/<author>`, normalizes and chunks each
    /// document, embeds pending chunks, and stores them. Documents
    /// whose chunks are already fully stored are skipped; partially
    /// stored documents resume from the missing indices.
    Ingest {
        /// Author folder name (e.g. `hume`).
        author: String,

        /// Domain tag stamped on every stored passage (e.g. `ethics`).
        #[arg(long)]
        domain: Option<String>,

        /// Show document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Import a structured positions file (pipe-delimited or JSON).
    ///
    /// Positions already present (by id) are skipped, so reloading a
    /// file is a no-op.
    Positions {
        /// Path to the positions file.
        file: PathBuf,

        /// Default author for entries that don't name one.
        #[arg(long)]
        author: Option<String>,

        /// Input format: `pipe` or `json`. Inferred from the file
        /// extension when omitted.
        #[arg(long)]
        format: Option<String>,
    },

    /// Ranked retrieval over one author's corpus.
    Search {
        /// The search query.
        query: String,

        /// Author whose corpus to search.
        #[arg(long)]
        author: String,

        /// Search mode: `vector` (requires embeddings) or `keyword`.
        #[arg(long, default_value = "keyword")]
        mode: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Audited staged retrieval: positions, then quotes, then prose,
    /// with a full decision trace.
    Audit {
        /// The query to answer.
        query: String,

        /// Author whose corpus to search.
        #[arg(long)]
        author: String,

        /// Report format: `text` or `json`.
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Database statistics.
    Stats,

    /// Delete stored data.
    Clear {
        /// Author whose data to delete.
        author: String,

        /// Only delete this document's passages.
        #[arg(long)]
        title: Option<String>,
    },
}

fn progress_mode(flag: &str) -> Result<ProgressMode> {
    match flag {
        "auto" => Ok(ProgressMode::default_for_tty()),
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => anyhow::bail!("Unknown progress mode: {}. Use auto, off, human, or json.", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Authors => {
            let authors = corpus::list_authors(&cfg.library)?;
            if authors.is_empty() {
                println!("No author folders under {}.", cfg.library.root.display());
            } else {
                for author in authors {
                    println!("{}", author);
                }
            }
        }
        Commands::Ingest {
            author,
            domain,
            dry_run,
            limit,
        } => {
            let reporter = progress_mode(&cli.progress)?.reporter();
            ingest::run_ingest(&cfg, &author, domain, dry_run, limit, reporter.as_ref()).await?;
        }
        Commands::Positions {
            file,
            author,
            format,
        } => {
            let format = match format {
                Some(f) => f.parse()?,
                None => positions::PositionFormat::for_path(&file),
            };
            let text = std::fs::read_to_string(&file)?;
            let parsed = positions::parse_positions(&text, format, author.as_deref())?;

            let embedder = corpus_harness::embedding::create_embedder(&cfg.embedding)?;
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);

            let report = positions::import_positions(&store, embedder.as_deref(), &parsed).await?;

            println!("positions {}", file.display());
            println!("  parsed: {}", parsed.len());
            println!("  inserted: {}", report.inserted);
            println!("  skipped: {}", report.skipped);
            println!("  errors: {}", report.errors);
            println!("ok");

            store.pool().close().await;
        }
        Commands::Search {
            query,
            author,
            mode,
            limit,
        } => {
            search::run_search(&cfg, &query, &mode, &author, limit).await?;
        }
        Commands::Audit {
            query,
            author,
            format,
            output,
        } => {
            let embedder = corpus_harness::embedding::create_embedder(&cfg.embedding)?;
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);

            let outcome = retrieve::audited_search(
                &store,
                embedder.as_deref(),
                &cfg.retrieval,
                &query,
                &author,
            )
            .await?;

            export::write_report(&outcome, format.parse()?, output.as_deref())?;

            store.pool().close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clear { author, title } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);

            let removed = match title {
                Some(title) => store.clear_document(&author, &title).await?,
                None => store.clear_author(&author).await?,
            };
            println!("cleared {} rows", removed);

            store.pool().close().await;
        }
    }

    Ok(())
}
