//! PricePulse - Telegram bot for crypto price-change alerts.
//! Polls exchange tickers per subscriber, caches snapshots with a TTL,
//! and notifies chats about moves beyond a configured threshold.

pub mod app;
pub mod application;
pub mod exchanges;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::monitor::{MonitorController, MonitorStatus};
pub use exchanges::Exchange;
pub use shared::config::Config;
