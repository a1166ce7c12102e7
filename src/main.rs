use anyhow::Result;
use clap::{Parser, Subcommand};
use embed_index::commands::{IngestOptions, QueryOptions, ingest_sources, query_index, show_status};
use embed_index::config::{run_interactive_config, show_config};
use embed_index::index::Metric;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "embed-index")]
#[command(about = "Chunk, embed and index documents into a local similarity index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding endpoint and index defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Fetch, chunk and embed sources into an index
    Ingest {
        /// URLs or local file paths to ingest
        #[arg(required = true)]
        sources: Vec<String>,
        /// Index directory, defaults to the configured index path
        #[arg(long)]
        index: Option<PathBuf>,
        /// Maximum chunk size in characters
        #[arg(long)]
        max_size: Option<usize>,
        /// Characters shared between consecutive chunks
        #[arg(long)]
        overlap: Option<usize>,
        /// API key for the hosted provider, overriding the environment
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Find the entries nearest to a query
    Query {
        /// Text to search for
        text: String,
        /// Index directory, defaults to the configured index path
        #[arg(long)]
        index: Option<PathBuf>,
        /// Number of results to return
        #[arg(short)]
        k: Option<usize>,
        /// Distance metric, "cosine" or "euclidean"
        #[arg(long)]
        metric: Option<Metric>,
        /// API key for the hosted provider, overriding the environment
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Show what an index holds
    Status {
        /// Index directory, defaults to the configured index path
        #[arg(long)]
        index: Option<PathBuf>,
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
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest {
            sources,
            index,
            max_size,
            overlap,
            api_key,
        } => {
            ingest_sources(IngestOptions {
                sources,
                index,
                max_size,
                overlap,
                api_key,
            })
            .await?;
        }
        Commands::Query {
            text,
            index,
            k,
            metric,
            api_key,
        } => {
            query_index(QueryOptions {
                text,
                index,
                k,
                metric,
                api_key,
            })
            .await?;
        }
        Commands::Status { index } => {
            show_status(index).await?;
        }
    }

    Ok(())
}
