//! Bybit spot-ticker adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::shared::errors::ExchangeError;
use crate::shared::types::Ticker;

use super::Exchange;

/// Ответ Bybit API v5
#[derive(Debug, Deserialize)]
struct BybitResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: Option<String>,
    result: Option<BybitResult>,
}

#[derive(Debug, Deserialize)]
struct BybitResult {
    list: Vec<Value>,
}

/// Ticker fields come back as strings
#[derive(Debug, Deserialize)]
struct BybitTicker {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "prevPrice24h")]
    prev_price_24h: Option<String>,
}

pub struct BybitExchange {
    http_client: Client,
    base_url: String,
}

impl BybitExchange {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: "https://api.bybit.com".to_string(),
        }
    }

    async fn request_tickers(&self) -> Result<Vec<Value>, ExchangeError> {
        let url = format!("{}/v5/market/tickers?category=spot", self.base_url);
        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ExchangeError::Api(format!(
                "status {}",
                response.status()
            )));
        }

        let body: BybitResponse = response.json().await?;
        if body.ret_code != 0 {
            return Err(ExchangeError::Api(
                body.ret_msg.unwrap_or_else(|| "unknown retCode".to_string()),
            ));
        }

        let result = body
            .result
            .ok_or_else(|| ExchangeError::Decode("missing result field".to_string()))?;
        Ok(result.list)
    }
}

/// Convert raw ticker objects into `Ticker` records. A malformed record
/// is skipped individually and never aborts the batch; an unparseable
/// reference price keeps the ticker with `reference_price: None`.
fn parse_tickers(raw: Vec<Value>) -> Vec<Ticker> {
    let mut tickers = Vec::with_capacity(raw.len());

    for item in raw {
        let ticker: BybitTicker = match serde_json::from_value(item) {
            Ok(t) => t,
            Err(e) => {
                debug!("Bybit: пропущен элемент некорректной формы: {}", e);
                continue;
            }
        };

        let last_price = match ticker.last_price.parse::<f64>() {
            Ok(p) => p,
            Err(_) => {
                debug!(
                    "Bybit: пропущен тикер {} с нечисловой ценой '{}'",
                    ticker.symbol, ticker.last_price
                );
                continue;
            }
        };

        let reference_price = ticker
            .prev_price_24h
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok());

        tickers.push(Ticker {
            symbol: ticker.symbol,
            last_price,
            reference_price,
        });
    }

    tickers
}

#[async_trait]
impl Exchange for BybitExchange {
    fn name(&self) -> &'static str {
        "Bybit"
    }

    async fn fetch_market_data(&self) -> Vec<Ticker> {
        match self.request_tickers().await {
            Ok(raw) => {
                let tickers = parse_tickers(raw);
                debug!("Bybit: получено {} тикеров", tickers.len());
                tickers
            }
            Err(e) => {
                error!("Ошибка при получении рыночных данных с Bybit: {}", e);
                Vec::new()
            }
        }
    }
}
