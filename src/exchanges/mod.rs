//! Market data sources - exchange adapters behind a unified trait

pub mod bybit;
pub mod kucoin;

pub use bybit::BybitExchange;
pub use kucoin::KucoinExchange;

use async_trait::async_trait;

use crate::shared::types::{SignificantChange, Ticker};

/// Unified interface over a crypto exchange.
///
/// Adapters never surface transport errors to the caller: an outage
/// degrades to an empty snapshot so the polling loop stays alive.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Stable exchange identifier, also used as the cache key
    fn name(&self) -> &'static str;

    /// Fetch the full spot-ticker snapshot. Transport or API failures
    /// are logged inside the adapter and return an empty vec.
    async fn fetch_market_data(&self) -> Vec<Ticker>;

    /// Filter tickers that moved beyond `threshold` percent
    fn filter_significant_changes(
        &self,
        data: &[Ticker],
        threshold: f64,
    ) -> Vec<SignificantChange> {
        filter_significant_changes(data, threshold)
    }
}

/// Pure filter over a snapshot: percent change against the reference
/// price, included when `abs(change) >= threshold`. Tickers without a
/// usable reference price are skipped — insufficient data, not an error.
pub fn filter_significant_changes(data: &[Ticker], threshold: f64) -> Vec<SignificantChange> {
    let mut significant = Vec::new();

    for ticker in data {
        let Some(price_change) = ticker.price_change() else {
            continue;
        };

        if price_change.abs() >= threshold {
            significant.push(SignificantChange {
                symbol: ticker.symbol.clone(),
                price_change,
                last_price: ticker.last_price,
                // price_change() guarantees the reference is present
                reference_price: ticker.reference_price.unwrap_or_default(),
            });
        }
    }

    significant
}
