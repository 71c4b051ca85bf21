//! Common types used across the application

use serde::{Deserialize, Serialize};

/// One ticker record from an exchange snapshot.
///
/// `reference_price` is the basis for the percent-change computation
/// (24h open, average price — whatever the exchange provides). A record
/// without a usable reference is kept but never produces a change alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: f64,
    pub reference_price: Option<f64>,
}

impl Ticker {
    /// Percent change from the reference price, `None` when the
    /// reference is missing or non-positive.
    pub fn price_change(&self) -> Option<f64> {
        match self.reference_price {
            Some(reference) if reference > 0.0 => {
                Some((self.last_price - reference) / reference * 100.0)
            }
            _ => None,
        }
    }
}

/// Ticker that moved beyond the subscriber's threshold. Derived per
/// polling cycle, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificantChange {
    pub symbol: String,
    pub price_change: f64,
    pub last_price: f64,
    pub reference_price: f64,
}

/// Per-subscriber monitoring parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorParams {
    pub check_interval_secs: u64,
    pub threshold_pct: f64,
}

impl Default for MonitorParams {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            threshold_pct: 5.0,
        }
    }
}

/// Persisted subscriber record, keyed by the Telegram user id
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: String,
    pub is_monitoring_active: bool,
    pub params: MonitorParams,
}
