//! pinlens-bridge — developer CLI for the mining and fetch pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pinlens::{mine_payload, PersistedCache, StatsCache, StatsStore, CACHE_STORAGE_KEY};
use pinlens_bridge::config::{resolve_cache_path, BridgeConfig};
use pinlens_bridge::fetch::DirectFetcher;

#[derive(Parser)]
#[command(
    name = "pinlens-bridge",
    about = "PinLens developer tools — mine captured payloads, fetch pin stats, inspect the cache",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the classifier and extractor over a captured response body.
    Mine {
        /// Path to a JSON file holding the raw response body.
        file: PathBuf,
    },

    /// Direct-fetch one or more pin ids through the batch engine.
    Fetch {
        /// Pin ids to fetch.
        ids: Vec<String>,

        /// Override the API base URL.
        #[arg(long)]
        base: Option<String>,
    },

    /// Inspect a persisted cache file.
    CacheInfo {
        /// Path to the cache file.
        #[arg(short, long)]
        cache: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Mine { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let body: serde_json::Value = serde_json::from_str(&raw)?;
            let records = mine_payload(&body);
            tracing::info!(count = records.len(), "records mined");

            let output: Vec<_> = records.into_iter().map(|(_, record)| record).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Fetch { ids, base } => {
            if ids.is_empty() {
                anyhow::bail!("at least one pin id is required");
            }
            let mut config = BridgeConfig::default();
            if let Some(base) = base {
                config.api_base = base;
            }

            let fetcher = DirectFetcher::new(&config)?;
            let outcomes = fetcher.fetch_batch(&ids).await;

            let mut results = Vec::new();
            for (id, outcome) in ids.iter().zip(outcomes) {
                results.push(serde_json::json!({
                    "id": id,
                    "rate_limited": outcome.rate_limited,
                    "record": outcome.record,
                }));
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Commands::CacheInfo { cache } => {
            let path = resolve_cache_path(cache.as_deref());
            let store = pinlens::FileStore::new(&path);

            let mut stats_cache = StatsCache::default();
            match store.get(CACHE_STORAGE_KEY).await? {
                Some(value) => {
                    let snapshot: PersistedCache = serde_json::from_value(value)?;
                    stats_cache.load_snapshot(snapshot);
                }
                None => tracing::warn!(%path, "no persisted cache found"),
            }

            let stats = stats_cache.stats();
            let mut ids = stats_cache.list_ids();
            ids.sort();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "path": path,
                    "stats": stats,
                    "ids": ids,
                }))?
            );
        }
    }

    Ok(())
}
