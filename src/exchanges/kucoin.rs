//! KuCoin spot-ticker adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::shared::errors::ExchangeError;
use crate::shared::types::Ticker;

use super::Exchange;

/// Ответ KuCoin `allTickers`
#[derive(Debug, Deserialize)]
struct KucoinResponse {
    code: String,
    data: Option<KucoinData>,
}

#[derive(Debug, Deserialize)]
struct KucoinData {
    ticker: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct KucoinTicker {
    symbol: String,
    last: Option<String>,
    #[serde(rename = "averagePrice")]
    average_price: Option<String>,
    #[serde(rename = "changeRate")]
    change_rate: Option<String>,
}

pub struct KucoinExchange {
    http_client: Client,
    base_url: String,
}

impl KucoinExchange {
    pub fn new(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: "https://api.kucoin.com".to_string(),
        }
    }

    async fn request_tickers(&self) -> Result<Vec<Value>, ExchangeError> {
        let url = format!("{}/api/v1/market/allTickers", self.base_url);
        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ExchangeError::Api(format!(
                "status {}",
                response.status()
            )));
        }

        let body: KucoinResponse = response.json().await?;
        if body.code != "200000" {
            return Err(ExchangeError::Api(format!("code {}", body.code)));
        }

        let data = body
            .data
            .ok_or_else(|| ExchangeError::Decode("missing data field".to_string()))?;
        Ok(data.ticker)
    }
}

/// Convert raw KuCoin tickers into `Ticker` records. The reference price
/// is `averagePrice` when present, otherwise derived from `changeRate`
/// (`last / (1 + rate)`), otherwise absent. Records without a numeric
/// last price are skipped individually.
fn parse_tickers(raw: Vec<Value>) -> Vec<Ticker> {
    let mut tickers = Vec::with_capacity(raw.len());

    for item in raw {
        let ticker: KucoinTicker = match serde_json::from_value(item) {
            Ok(t) => t,
            Err(e) => {
                debug!("KuCoin: пропущен элемент некорректной формы: {}", e);
                continue;
            }
        };

        let last_price = match ticker.last.as_deref().and_then(|p| p.parse::<f64>().ok()) {
            Some(p) => p,
            None => {
                debug!(
                    "KuCoin: пропущен тикер {} без числовой цены",
                    ticker.symbol
                );
                continue;
            }
        };

        let average = ticker
            .average_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0);

        let reference_price = average.or_else(|| {
            ticker
                .change_rate
                .as_deref()
                .and_then(|r| r.parse::<f64>().ok())
                .filter(|rate| (1.0 + rate) > 0.0)
                .map(|rate| last_price / (1.0 + rate))
        });

        tickers.push(Ticker {
            symbol: ticker.symbol,
            last_price,
            reference_price,
        });
    }

    tickers
}

#[async_trait]
impl Exchange for KucoinExchange {
    fn name(&self) -> &'static str {
        "KuCoin"
    }

    async fn fetch_market_data(&self) -> Vec<Ticker> {
        match self.request_tickers().await {
            Ok(raw) => {
                let tickers = parse_tickers(raw);
                debug!("KuCoin: получено {} тикеров", tickers.len());
                tickers
            }
            Err(e) => {
                error!("Ошибка при получении рыночных данных с KuCoin: {}", e);
                Vec::new()
            }
        }
    }
}
