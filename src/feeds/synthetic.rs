//! Synthetic random-walk fetcher for demos and tests

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Candle, PriceFetcher};
use crate::core::Result;

/// Per-bar drift as a fraction of the last price.
const STEP_FRACTION: f64 = 0.0005;

/// Random walk around a starting price. Never fails; deterministic under a
/// fixed seed.
pub struct SyntheticFetcher {
    state: Mutex<WalkState>,
}

struct WalkState {
    rng: StdRng,
    last: f64,
}

impl SyntheticFetcher {
    pub fn new(start: f64) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng: StdRng::from_os_rng(),
                last: start,
            }),
        }
    }

    pub fn with_seed(start: f64, seed: u64) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                last: start,
            }),
        }
    }
}

#[async_trait]
impl PriceFetcher for SyntheticFetcher {
    async fn fetch(&self) -> Result<Candle> {
        let mut state = self.state.lock();
        let open = state.last;
        let drift: f64 = state.rng.random_range(-1.0..1.0);
        let close = open * (1.0 + drift * STEP_FRACTION);
        let wick = open * STEP_FRACTION * 0.25;
        state.last = close;
        Ok(Candle {
            open,
            high: open.max(close) + wick,
            low: open.min(close) - wick,
            close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_walk_is_deterministic() {
        let a = SyntheticFetcher::with_seed(2000.0, 7);
        let b = SyntheticFetcher::with_seed(2000.0, 7);
        for _ in 0..10 {
            let ca = a.fetch().await.unwrap();
            let cb = b.fetch().await.unwrap();
            assert_eq!(ca.close, cb.close);
            assert!(ca.low <= ca.open && ca.high >= ca.close);
        }
    }
}
