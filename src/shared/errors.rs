//! Error handling for the application

use thiserror::Error;

/// Exchange-related errors. Caught inside each adapter's
/// `fetch_market_data`, where they degrade to an empty snapshot —
/// they never reach the polling loop.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Exchange API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Storage-related errors (Redis cache and subscriber store)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Invalid monitoring parameters from `/conf`. The message is shown to
/// the user as-is, so it is worded for the chat, not the log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Интервал проверки должен быть больше нуля.")]
    InvalidInterval,

    #[error("Порог изменения цены не может быть отрицательным: {0}")]
    InvalidThreshold(f64),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Telegram API error: {0}")]
    Telegram(String),
}
