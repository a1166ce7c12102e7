use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{Config, EmbeddingProvider};
use crate::embeddings::{ChunkingConfig, client_from_config};
use crate::index::Metric;
use crate::indexer::{IndexManager, IngestReport};
use crate::sources::SourceFetcher;

const SNIPPET_CHARS: usize = 200;

/// Options for the `ingest` command
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub sources: Vec<String>,
    pub index: Option<PathBuf>,
    pub max_size: Option<usize>,
    pub overlap: Option<usize>,
    pub api_key: Option<String>,
}

/// Options for the `query` command
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub text: String,
    pub index: Option<PathBuf>,
    pub k: Option<usize>,
    pub metric: Option<Metric>,
    pub api_key: Option<String>,
}

/// API key for the hosted provider: the explicit value, else the configured
/// environment variable.
#[inline]
pub fn resolve_api_key(config: &Config, explicit: Option<String>) -> Option<String> {
    if config.provider != EmbeddingProvider::Hosted {
        return None;
    }
    explicit
        .or_else(|| std::env::var(&config.hosted.api_key_env).ok())
        .filter(|key| !key.trim().is_empty())
}

/// Configured chunking with command-line overrides applied
#[inline]
pub fn resolve_chunking(
    config: &Config,
    max_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<ChunkingConfig> {
    let chunking = ChunkingConfig::new(
        max_size.unwrap_or(config.chunking.max_size),
        overlap.unwrap_or(config.chunking.overlap),
    )?;
    Ok(chunking)
}

fn build_manager(config: &Config, api_key: Option<String>) -> Result<IndexManager> {
    let api_key = resolve_api_key(config, api_key);
    let client = client_from_config(config, api_key).with_context(|| {
        format!(
            "Failed to create {} embedding client (set {} or pass --api-key for the hosted provider)",
            config.provider, config.hosted.api_key_env
        )
    })?;
    Ok(IndexManager::from_config(client, &config.index))
}

/// Fetch sources and append them to an index
#[inline]
pub async fn ingest_sources(options: IngestOptions) -> Result<()> {
    let config = Config::load_default()?;
    let chunking = resolve_chunking(&config, options.max_size, options.overlap)?;
    let index_path = options
        .index
        .unwrap_or_else(|| config.default_index_path());
    let manager = build_manager(&config, options.api_key)?;
    let fetcher = SourceFetcher::new(&config.fetch);

    info!(
        "Ingesting {} sources into {}",
        options.sources.len(),
        index_path.display()
    );

    let bar = ProgressBar::new(options.sources.len() as u64).with_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] Fetching {msg}")
            .context("Invalid progress template")?,
    );
    let mut documents = Vec::with_capacity(options.sources.len());
    for source in &options.sources {
        bar.set_message(source.clone());
        documents.push(fetcher.fetch_document(source).await);
        bar.inc(1);
    }
    bar.finish_and_clear();

    eprintln!(
        "{}",
        style(format!("Embedding {} documents...", documents.len())).yellow()
    );
    let report = manager
        .ingest(&documents, &chunking, &index_path)
        .await
        .with_context(|| format!("Failed to ingest into {}", index_path.display()))?;

    print_ingest_report(&report, &index_path);
    Ok(())
}

fn print_ingest_report(report: &IngestReport, index_path: &Path) {
    let verb = if report.created { "Created" } else { "Updated" };
    println!(
        "{} {} {}",
        style("✓").green(),
        verb,
        style(index_path.display()).cyan()
    );
    println!("  Documents ingested: {}", report.documents_ingested);
    println!("  Entries added: {}", report.entries_added);
    println!("  Index size: {}", report.index_size);
    println!("  Estimated tokens: {}", report.estimated_tokens);

    if !report.skipped.is_empty() {
        println!(
            "{}",
            style(format!("⚠ Skipped {} sources:", report.skipped.len())).yellow()
        );
        for skipped in &report.skipped {
            println!("  {} ({})", skipped.source, style(&skipped.reason).red());
        }
    }
}

/// Search an index for the entries nearest to a query
#[inline]
pub async fn query_index(options: QueryOptions) -> Result<()> {
    let config = Config::load_default()?;
    let index_path = options
        .index
        .unwrap_or_else(|| config.default_index_path());
    let k = options.k.unwrap_or(config.index.default_k);
    let manager = build_manager(&config, options.api_key)?;

    debug!("Querying {} with k={}", index_path.display(), k);
    let results = match options.metric {
        Some(metric) => {
            manager
                .query_with_metric(&index_path, &options.text, k, metric)
                .await
        }
        None => manager.query(&index_path, &options.text, k).await,
    }
    .with_context(|| format!("Failed to query {}", index_path.display()))?;

    if results.is_empty() {
        println!("No entries in {}", index_path.display());
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let title = result
            .entry
            .metadata
            .get("title")
            .map_or(result.entry.source.as_str(), String::as_str);
        println!(
            "{}. {} {}",
            rank + 1,
            style(title).bold(),
            style(format!("(score {:.3})", result.similarity_score)).dim()
        );
        println!(
            "   {} #{}",
            style(&result.entry.source).cyan(),
            result.entry.chunk_index
        );
        println!("   {}", snippet(&result.entry.text));
        println!();
    }

    Ok(())
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        flat
    } else {
        let mut short: String = flat.chars().take(SNIPPET_CHARS).collect();
        short.push('…');
        short
    }
}

/// Print what an index holds
#[inline]
pub async fn show_status(index: Option<PathBuf>) -> Result<()> {
    let config = Config::load_default()?;
    let index_path = index.unwrap_or_else(|| config.default_index_path());
    let manager = build_manager(&config, None).or_else(|_| {
        // Describing an index needs no embedding endpoint
        let offline = Config {
            provider: EmbeddingProvider::Ollama,
            ..config.clone()
        };
        build_manager(&offline, None)
    })?;

    let summary = manager
        .describe(&index_path)
        .await
        .with_context(|| format!("Failed to read {}", index_path.display()))?;

    println!("{}", style("📋 Index Status").bold().cyan());
    println!("  Path: {}", style(summary.path.display()).cyan());
    println!("  Entries: {}", summary.entries);
    println!(
        "  Dimension: {}",
        summary
            .dimension
            .map_or_else(|| "unknown".to_string(), |d| d.to_string())
    );
    println!("  Metric: {}", summary.metric);
    println!(
        "  Model: {}",
        summary.model.as_deref().unwrap_or("unknown")
    );
    println!("  Sources ({}):", summary.sources.len());
    for source in &summary.sources {
        println!("    {}", source);
    }

    Ok(())
}
