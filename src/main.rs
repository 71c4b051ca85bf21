use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pricepulse::app;
use pricepulse::shared::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Telegram bot that watches crypto exchanges for sharp price moves")]
struct Args {
    /// Default check interval in seconds (overrides CHECK_INTERVAL)
    #[arg(long)]
    interval: Option<u64>,

    /// Default price-change threshold in percent (overrides PRICE_CHANGE_THRESHOLD)
    #[arg(long)]
    threshold: Option<f64>,

    /// Redis connection URL (overrides REDIS_URL)
    #[arg(long)]
    redis_url: Option<String>,

    /// Use a volatile in-memory store instead of Redis (local development)
    #[arg(long)]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional, real environments set variables directly
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Priority: CLI args > environment > defaults
    let mut config = Config::from_env()?;
    if let Some(interval) = args.interval {
        config.check_interval_secs = interval;
    }
    if let Some(threshold) = args.threshold {
        config.threshold_pct = threshold;
    }
    if let Some(redis_url) = args.redis_url {
        config.redis_url = redis_url;
    }

    app::run(config, args.memory_store).await
}
