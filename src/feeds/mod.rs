//! Price transport - pluggable raw OHLC sources

pub mod rest;
pub mod synthetic;

pub use rest::RestFetcher;
pub use synthetic::SyntheticFetcher;

use async_trait::async_trait;

use crate::core::Result;

/// One OHLC bar from the raw transport.
#[derive(Debug, Clone, Copy)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Raw price source. The ledger polls this to derive quotes; fetch failures
/// are transient and surface as feed errors handled by the engine's
/// reconnect path.
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Candle>;
}

/// Fixed-price fetcher for unit tests.
#[cfg(test)]
pub(crate) struct FixedFetcher {
    price: parking_lot::Mutex<f64>,
}

#[cfg(test)]
impl FixedFetcher {
    pub fn new(price: f64) -> Self {
        Self {
            price: parking_lot::Mutex::new(price),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock() = price;
    }
}

#[cfg(test)]
#[async_trait]
impl PriceFetcher for FixedFetcher {
    async fn fetch(&self) -> Result<Candle> {
        let p = *self.price.lock();
        Ok(Candle {
            open: p,
            high: p,
            low: p,
            close: p,
        })
    }
}
