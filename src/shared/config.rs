//! Environment-based configuration

use std::env;
use std::time::Duration;

use crate::shared::errors::AppError;
use crate::shared::types::MonitorParams;

/// Application configuration, resolved from the environment with
/// CLI overrides applied on top (CLI > env > default).
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub check_interval_secs: u64,
    pub threshold_pct: f64,
    pub cache_ttl_secs: u64,
    pub redis_url: String,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the environment. Only the bot token is
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self, AppError> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| AppError::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))?;

        Ok(Self {
            telegram_bot_token,
            check_interval_secs: env_parsed("CHECK_INTERVAL", 60)?,
            threshold_pct: env_parsed("PRICE_CHANGE_THRESHOLD", 5.0)?,
            cache_ttl_secs: env_parsed("CACHE_TTL", 300)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string()),
            http_timeout_secs: env_parsed("HTTP_TIMEOUT_SECS", 10)?,
        })
    }

    /// Default monitoring parameters for subscribers that have not
    /// configured their own via `/conf`.
    pub fn default_params(&self) -> MonitorParams {
        MonitorParams {
            check_interval_secs: self.check_interval_secs,
            threshold_pct: self.threshold_pct,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
