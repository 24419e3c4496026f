//! cinevec: vector similarity search over movie plots
//!
//! Embeds free-text queries with Voyage AI and runs them against a MongoDB
//! Atlas Vector Search index over `sample_mflix.embedded_movies`.

mod config;
mod demo;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cinevec_embed::{
    EmbedRequest, EmbeddingProvider, InputType, LoggingProvider, SharedProvider, VoyageConfig,
    VoyageProvider,
};
use cinevec_store::{
    AtlasStore, EmbeddingVector, InMemoryStore, QueryFilter, SearchOutcome, SharedVectorStore,
    SimilarityClient, SimilarityQuery, VectorIndexDefinition,
};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;

/// Vector similarity search over movie plots
#[derive(Parser)]
#[command(name = "cinevec")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .cinevec directory or config file (default: search for .cinevec/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to daily rotating files in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Voyage AI API key (or use VOYAGE_API_KEY env var)
    #[arg(long, global = true, env = "VOYAGE_API_KEY", hide_env_values = true)]
    voyage_key: Option<String>,

    /// MongoDB connection string (or use MONGODB_URI env var)
    #[arg(long, global = true, env = "MONGODB_URI", hide_env_values = true)]
    mongodb_uri: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new .cinevec directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Embed one or more texts and print the vectors
    Embed {
        /// Texts to embed, in order
        #[arg(required = true)]
        texts: Vec<String>,

        /// Print the vectors as a JSON array
        #[arg(long)]
        json: bool,

        /// Embed as search queries instead of documents
        #[arg(long)]
        query: bool,
    },

    /// Find movies whose plots match a description
    Search {
        /// Free-text description
        text: String,

        /// Maximum number of matches (default: from config)
        #[arg(long)]
        limit: Option<usize>,

        /// Only movies released in or after this year
        #[arg(long)]
        year_from: Option<i64>,

        /// Only movies released in or before this year
        #[arg(long)]
        year_to: Option<i64>,

        /// Exhaustive search instead of approximate nearest neighbours
        #[arg(long)]
        exact: bool,

        /// Search a small built-in corpus instead of MongoDB
        #[arg(long)]
        in_memory: bool,
    },

    /// Find movies with plots similar to a stored movie
    Similar {
        /// Title of the stored movie
        #[arg(long)]
        title: String,

        /// Maximum number of matches (default: from config)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage the vector search index
    Index {
        #[command(subcommand)]
        action: IndexCommand,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Create the index if it does not exist
    Create,

    /// Show the index lifecycle state
    Status,

    /// Wait until the index is ready to query
    Wait {
        /// Seconds between status checks
        #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
        poll_secs: u64,

        /// Give up after this many seconds (default: wait indefinitely)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging to stderr, keeping stdout for results.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(verbose))
        .init();
}

/// Initialize logging to daily rotating files in `log_dir`.
fn init_file_logging(log_dir: &Path, verbose: bool) {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "cinevec.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(env_filter(verbose))
        .init();
}

/// Load config from an explicit path or auto-discover `.cinevec/config.toml`.
fn load_config(override_path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = override_path {
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let config = Config::from_file(&config_file)?;
        info!("Loaded config from {}", config_file.display());
        return Ok(config);
    }

    match Config::find_and_load() {
        Ok(Some((config, dir))) => {
            info!("Found config at {}", dir.display());
            Ok(config)
        }
        Ok(None) => {
            tracing::debug!("No .cinevec/config.toml found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Error searching for config: {}, using defaults", e);
            Ok(Config::default())
        }
    }
}

/// Load config and reject it if any field is invalid.
fn load_validated_config(override_path: Option<&PathBuf>) -> Result<Config> {
    let config = load_config(override_path)?;
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{}", e);
        }
        anyhow::bail!("Invalid configuration ({} errors)", errors.len());
    }
    Ok(config)
}

fn create_provider(voyage: &VoyageConfig) -> Result<SharedProvider> {
    let provider = VoyageProvider::new(voyage.clone())?;
    Ok(Arc::new(LoggingProvider::new(provider)))
}

/// Embed `texts` in one request with the configured model settings.
async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    voyage: &VoyageConfig,
    texts: Vec<String>,
    input_type: InputType,
) -> Result<Vec<EmbeddingVector>> {
    let request = EmbedRequest::new(texts, &voyage.model, voyage.output_dimension)
        .with_truncation(voyage.truncation)
        .with_input_type(input_type);
    let response = provider
        .embed(request)
        .await
        .context("Embedding request failed")?;
    Ok(response.into_vectors())
}

/// Pre-filter on the release year. Either bound may be left open.
fn year_filter(from: Option<i64>, to: Option<i64>) -> Option<QueryFilter> {
    match (from, to) {
        (Some(from), Some(to)) => Some(QueryFilter::between("year", from, to)),
        (Some(from), None) => Some(QueryFilter::gte("year", from)),
        (None, Some(to)) => Some(QueryFilter::lte("year", to)),
        (None, None) => None,
    }
}

async fn connect_atlas(config: &Config, uri: Option<&str>) -> Result<SharedVectorStore> {
    let atlas = config.atlas_config(uri)?;
    let store = AtlasStore::connect(atlas)
        .await
        .context("Failed to configure MongoDB client")?;
    Ok(Arc::new(store))
}

/// In-memory store holding the demo corpus, embedded with `provider`.
async fn demo_store(
    provider: &dyn EmbeddingProvider,
    voyage: &VoyageConfig,
    definition: &VectorIndexDefinition,
) -> Result<SharedVectorStore> {
    let plots = demo::plots().map(str::to_string).collect();
    let embeddings = embed_texts(provider, voyage, plots, InputType::Document).await?;
    info!(movies = embeddings.len(), "Loaded demo corpus");

    let store = InMemoryStore::new()
        .with_documents(demo::documents(&definition.path, embeddings))
        .with_ready_index(definition.clone());
    Ok(Arc::new(store))
}

fn print_outcome(outcome: &SearchOutcome) {
    if !outcome.is_complete() {
        eprintln!(
            "Warning: index is {}; results may be incomplete.",
            outcome.index_state
        );
    }
    if outcome.is_empty() {
        println!("No matches.");
        return;
    }

    for (rank, m) in outcome.matches.iter().enumerate() {
        let title = m.document.get_str("title").unwrap_or("(untitled)");
        let year = m
            .document
            .get_i64("year")
            .map(|y| y.to_string())
            .unwrap_or_else(|| "?".to_string());
        match m.score {
            Some(score) => println!("{:>2}. {:.4}  {} ({})", rank + 1, score, title, year),
            None => println!("{:>2}. {} ({})", rank + 1, title, year),
        }
    }
}

fn print_embeddings(texts: &[String], vectors: &[EmbeddingVector], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(vectors)?);
        return Ok(());
    }

    for (text, vector) in texts.iter().zip(vectors) {
        let head: Vec<String> = vector
            .as_slice()
            .iter()
            .take(4)
            .map(|x| format!("{:.4}", x))
            .collect();
        println!("{} dims [{}, ...]  {}", vector.dimensions(), head.join(", "), text);
    }
    Ok(())
}

fn run_init(force: bool) -> Result<()> {
    use config::{CINEVEC_DIR, CONFIG_FILE, DEFAULT_CONFIG};

    let cinevec_dir = PathBuf::from(CINEVEC_DIR);
    let config_path = cinevec_dir.join(CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(".cinevec/config.toml already exists. Use --force to overwrite.");
    }

    if !cinevec_dir.exists() {
        std::fs::create_dir_all(&cinevec_dir)?;
        info!("Created {}/", cinevec_dir.display());
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    info!("Created {}", config_path.display());
    info!("Next steps:");
    info!("  1. Set VOYAGE_API_KEY and MONGODB_URI (or edit .cinevec/config.toml)");
    info!("  2. Run 'cinevec index create' and 'cinevec index wait'");
    info!("  3. Run 'cinevec search \"time travel\"'");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_dir {
        Some(dir) => init_file_logging(dir, cli.verbose),
        None => init_logging(cli.verbose),
    }

    let voyage_key = cli.voyage_key.as_deref();
    let mongodb_uri = cli.mongodb_uri.as_deref();

    match cli.command {
        Commands::Init { force } => run_init(force)?,

        Commands::Embed { texts, json, query } => {
            let config = load_validated_config(cli.config.as_ref())?;
            let voyage = config.voyage_config(voyage_key)?;
            let provider = create_provider(&voyage)?;
            let input_type = if query {
                InputType::Query
            } else {
                InputType::Document
            };
            let vectors = embed_texts(provider.as_ref(), &voyage, texts.clone(), input_type).await?;
            print_embeddings(&texts, &vectors, json)?;
        }

        Commands::Search {
            text,
            limit,
            year_from,
            year_to,
            exact,
            in_memory,
        } => {
            let config = load_validated_config(cli.config.as_ref())?;
            let definition = config.index_definition()?;
            let voyage = config.voyage_config(voyage_key)?;
            let provider = create_provider(&voyage)?;

            let store = if in_memory {
                demo_store(provider.as_ref(), &voyage, &definition).await?
            } else {
                connect_atlas(&config, mongodb_uri).await?
            };
            let client = SimilarityClient::new(store).with_index(definition.clone());

            let vector = embed_texts(provider.as_ref(), &voyage, vec![text], InputType::Query)
                .await?
                .into_iter()
                .next()
                .context("Provider returned no embedding")?;

            let mut query =
                SimilarityQuery::new(&definition.path, vector, limit.unwrap_or(config.search.limit))
                    .exact(exact || config.search.exact);
            if let Some(candidates) = config.search.num_candidates {
                query = query.with_num_candidates(candidates);
            }
            if let Some(filter) = year_filter(year_from, year_to) {
                query = query.with_filter(filter);
            }

            let outcome = client.search(query).await?;
            print_outcome(&outcome);
        }

        Commands::Similar { title, limit } => {
            let config = load_validated_config(cli.config.as_ref())?;
            let definition = config.index_definition()?;
            let store = connect_atlas(&config, mongodb_uri).await?;
            let client = SimilarityClient::new(store).with_index(definition.clone());

            let (source, outcome) = client
                .search_like(
                    &definition.path,
                    &QueryFilter::eq("title", title.as_str()),
                    limit.unwrap_or(config.search.limit),
                )
                .await
                .with_context(|| format!("Failed to find movies similar to '{}'", title))?;

            println!(
                "Similar to {} ({}):",
                source.get_str("title").unwrap_or(&title),
                source.get_i64("year").map(|y| y.to_string()).unwrap_or_default()
            );
            print_outcome(&outcome);
        }

        Commands::Index { action } => {
            let config = load_validated_config(cli.config.as_ref())?;
            let definition = config.index_definition()?;
            let store = connect_atlas(&config, mongodb_uri).await?;
            let client = SimilarityClient::new(store).with_index(definition.clone());

            match action {
                IndexCommand::Create => {
                    let created = client.create_missing_indexes().await?;
                    if created.is_empty() {
                        println!("Index {} already exists.", definition.name);
                    } else {
                        println!("Started building index {}.", created.join(", "));
                    }
                }
                IndexCommand::Status => {
                    let state = client.index_state(&definition.path).await?;
                    println!("{}: {}", definition.name, state);
                }
                IndexCommand::Wait {
                    poll_secs,
                    timeout_secs,
                } => {
                    let wait = client.wait_until_ready(Duration::from_secs(poll_secs));
                    match timeout_secs {
                        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
                            .await
                            .with_context(|| {
                                format!("Index {} not ready after {}s", definition.name, secs)
                            })??,
                        None => wait.await?,
                    }
                    println!("{}: ready", definition.name);
                }
            }
        }
    }

    Ok(())
}
