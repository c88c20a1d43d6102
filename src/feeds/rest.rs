//! REST polling fetcher for market data

use async_trait::async_trait;

use super::{Candle, PriceFetcher};
use crate::core::{Error, Result};

/// Polls a JSON endpoint returning one OHLC bar per request, e.g.
/// `{"open": 2001.2, "high": 2003.0, "low": 2000.8, "close": 2002.5}`.
pub struct RestFetcher {
    url: String,
    client: reqwest::Client,
}

impl RestFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PriceFetcher for RestFetcher {
    async fn fetch(&self) -> Result<Candle> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let close = resp["close"]
            .as_f64()
            .ok_or_else(|| Error::Feed(format!("missing close price in payload from {}", self.url)))?;

        Ok(Candle {
            open: resp["open"].as_f64().unwrap_or(close),
            high: resp["high"].as_f64().unwrap_or(close),
            low: resp["low"].as_f64().unwrap_or(close),
            close,
        })
    }
}
