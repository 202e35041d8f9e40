//! HTTP Extractor - Entry Point
//!
//! Fetches one endpoint through the middleware pipeline and prints the JSON body.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use http_extractor::ExtractorClient;
use http_extractor::config::{CacheConfig, Config};

#[derive(Parser, Debug)]
#[command(name = "http-extractor")]
#[command(about = "Pull JSON from a REST API with caching, logging and signing middleware")]
#[command(version)]
struct Cli {
    /// JSON config file ({"parameters": {"api": ..., "cache": ...}})
    #[arg(long, env = "EXTRACTOR_CONFIG")]
    config: Option<PathBuf>,

    /// API base URL (overrides the config file)
    #[arg(long, env = "EXTRACTOR_BASE_URL")]
    base_url: Option<String>,

    /// Endpoint to fetch, relative to the base URL or absolute
    #[arg(long, default_value = "")]
    endpoint: String,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Cache every response for this many seconds
    #[arg(long, env = "EXTRACTOR_CACHE_TTL", allow_negative_numbers = true)]
    cache_ttl: Option<i64>,

    /// Keep cached responses on disk in this directory
    #[arg(long, env = "EXTRACTOR_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays pure JSON output
    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match (&cli.config, &cli.base_url) {
        (Some(path), base_url) => {
            let mut config = Config::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            if let Some(base_url) = base_url {
                config.base_url = Config::new(base_url)?.base_url;
            }
            config
        }
        (None, Some(base_url)) => Config::new(base_url)?,
        (None, None) => anyhow::bail!("either --config or --base-url is required"),
    };

    if let Some(ttl) = cli.cache_ttl {
        let mut cache = CacheConfig::from_ttl_secs(ttl)?;
        cache.dir = config.cache.take().and_then(|existing| existing.dir);
        config.cache = Some(cache);
    }
    if let Some(dir) = &cli.cache_dir {
        let cache = match config.cache.take() {
            Some(cache) => cache,
            None => CacheConfig::from_ttl_secs(http_extractor::config::api::CACHE_TTL_SECS)?,
        };
        config.cache = Some(cache.with_dir(dir));
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let config = load_config(&cli)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.base_url,
        cache = config.has_cache(),
        "Starting HTTP extractor"
    );

    let client = ExtractorClient::new(config)?;
    let body = client.get(&cli.endpoint, &cli.params).await?;

    println!("{}", serde_json::to_string_pretty(&body)?);

    tracing::info!("Extractor finished successfully");
    Ok(())
}
