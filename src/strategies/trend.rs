//! Trend following strategy
//!
//! EMA crossover entry, RSI filter, ATR-based stop placement. Indicators
//! update incrementally per quote; the strategy holds until every indicator
//! for a symbol is warm.

use std::collections::{HashMap, VecDeque};

use super::{Decision, Signal, Strategy};
use crate::core::Quote;

/// Trend following parameters
#[derive(Debug, Clone)]
pub struct TrendParams {
    /// Fast EMA period
    pub fast_period: usize,
    /// Slow EMA period
    pub slow_period: usize,
    /// Wilder RSI period
    pub rsi_period: usize,
    /// ATR smoothing period
    pub atr_period: usize,
    /// Stop distance = atr_multiplier * ATR
    pub atr_multiplier: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            fast_period: 9,
            slow_period: 21,
            rsi_period: 14,
            atr_period: 14,
            atr_multiplier: 2.0,
        }
    }
}

/// Per-symbol indicator state.
#[derive(Default)]
struct SymbolState {
    fast_ema: Option<f64>,
    slow_ema: Option<f64>,
    atr: Option<f64>,
    prev_close: Option<f64>,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
    rsi_seed: VecDeque<f64>,
}

/// Trend following strategy
pub struct TrendFollowing {
    params: TrendParams,
    state: HashMap<String, SymbolState>,
}

impl TrendFollowing {
    pub fn new(params: TrendParams) -> Self {
        Self {
            params,
            state: HashMap::new(),
        }
    }

    fn ema(price: f64, prev: Option<f64>, period: usize) -> f64 {
        match prev {
            None => price,
            Some(prev) => {
                let k = 2.0 / (period as f64 + 1.0);
                price * k + prev * (1.0 - k)
            }
        }
    }

    /// True range smoothed over the ATR period. Reads prev_close but does
    /// not advance it; RSI owns that update.
    fn update_atr(state: &mut SymbolState, high: f64, low: f64, period: usize) -> f64 {
        let tr = match state.prev_close {
            Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
            None => high - low,
        };
        let atr = match state.atr {
            Some(prev) => (prev * (period as f64 - 1.0) + tr) / period as f64,
            None => tr,
        };
        state.atr = Some(atr);
        atr
    }

    /// Wilder RSI: seeded from the first full window of deltas, then
    /// smoothed incrementally. None until the seed window fills.
    fn update_rsi(state: &mut SymbolState, close: f64, period: usize) -> Option<f64> {
        let prev = match state.prev_close {
            Some(p) => p,
            None => {
                state.prev_close = Some(close);
                return None;
            }
        };

        let delta = close - prev;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        match (state.avg_gain, state.avg_loss) {
            (Some(avg_gain), Some(avg_loss)) => {
                let p = period as f64;
                state.avg_gain = Some((avg_gain * (p - 1.0) + gain) / p);
                state.avg_loss = Some((avg_loss * (p - 1.0) + loss) / p);
            }
            _ => {
                state.rsi_seed.push_back(delta);
                if state.rsi_seed.len() > period {
                    state.rsi_seed.pop_front();
                }
                if state.rsi_seed.len() < period {
                    state.prev_close = Some(close);
                    return None;
                }
                let p = period as f64;
                state.avg_gain = Some(state.rsi_seed.iter().map(|d| d.max(0.0)).sum::<f64>() / p);
                state.avg_loss =
                    Some(state.rsi_seed.iter().map(|d| (-d).max(0.0)).sum::<f64>() / p);
            }
        }

        state.prev_close = Some(close);
        let avg_gain = state.avg_gain.unwrap_or(0.0);
        let avg_loss = state.avg_loss.unwrap_or(0.0);
        if avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

impl Strategy for TrendFollowing {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn get_signal(&mut self, quote: &Quote) -> Decision {
        let close = quote.close.unwrap_or_else(|| quote.mid());
        let high = quote.high.unwrap_or(close);
        let low = quote.low.unwrap_or(close);

        let state = self.state.entry(quote.symbol.clone()).or_default();

        let prev_fast = state.fast_ema;
        let prev_slow = state.slow_ema;
        let fast = Self::ema(close, prev_fast, self.params.fast_period);
        let slow = Self::ema(close, prev_slow, self.params.slow_period);
        state.fast_ema = Some(fast);
        state.slow_ema = Some(slow);

        let atr = Self::update_atr(state, high, low, self.params.atr_period);
        let rsi = Self::update_rsi(state, close, self.params.rsi_period);

        let (prev_fast, prev_slow, rsi) = match (prev_fast, prev_slow, rsi) {
            (Some(f), Some(s), Some(r)) => (f, s, r),
            _ => return Decision::hold(),
        };

        let bullish_cross = prev_fast <= prev_slow && fast > slow && rsi < 70.0;
        let bearish_cross = prev_fast >= prev_slow && fast < slow && rsi > 30.0;

        let stop_distance = self.params.atr_multiplier * atr;
        if bullish_cross {
            return Decision {
                signal: Signal::Buy,
                stop_loss: Some(close - stop_distance),
                take_profit: None,
            };
        }
        if bearish_cross {
            return Decision {
                signal: Signal::Sell,
                stop_loss: Some(close + stop_distance),
                take_profit: None,
            };
        }

        Decision::hold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(close: f64) -> Quote {
        Quote {
            symbol: "XAUUSD".to_string(),
            bid: close - 0.1,
            ask: close + 0.1,
            timestamp: chrono::Utc::now(),
            spread: 0.2,
            volatility: 0.001,
            open: Some(close),
            high: Some(close + 0.05),
            low: Some(close - 0.05),
            close: Some(close),
        }
    }

    #[test]
    fn holds_until_indicators_are_warm() {
        let mut strategy = TrendFollowing::default();
        for i in 0..14 {
            let decision = strategy.get_signal(&quote(100.0 + (i % 3) as f64 * 0.1));
            assert_eq!(decision.signal, Signal::Hold, "tick {i} should hold");
        }
    }

    #[test]
    fn decline_then_rally_emits_buy_with_stop_below_entry() {
        let mut strategy = TrendFollowing::default();
        let mut buy_seen = false;

        // Grind lower so the fast EMA sits under the slow, then rally.
        for i in 0..30 {
            strategy.get_signal(&quote(100.0 - i as f64 * 0.2));
        }
        for i in 0..40 {
            let close = 94.4 + i as f64 * 0.2;
            let decision = strategy.get_signal(&quote(close));
            assert_ne!(decision.signal, Signal::Sell);
            if decision.signal == Signal::Buy {
                let stop = decision.stop_loss.expect("buy must carry a stop");
                assert!(stop < close);
                buy_seen = true;
                break;
            }
        }
        assert!(buy_seen, "rally never produced a buy signal");
    }

    #[test]
    fn rally_then_slide_emits_sell_with_stop_above_entry() {
        let mut strategy = TrendFollowing::default();
        let mut sell_seen = false;

        for i in 0..30 {
            strategy.get_signal(&quote(100.0 + i as f64 * 0.2));
        }
        for i in 0..40 {
            let close = 105.6 - i as f64 * 0.2;
            let decision = strategy.get_signal(&quote(close));
            assert_ne!(decision.signal, Signal::Buy);
            if decision.signal == Signal::Sell {
                let stop = decision.stop_loss.expect("sell must carry a stop");
                assert!(stop > close);
                sell_seen = true;
                break;
            }
        }
        assert!(sell_seen, "slide never produced a sell signal");
    }

    #[test]
    fn indicator_state_is_per_symbol() {
        let mut strategy = TrendFollowing::default();
        for i in 0..30 {
            strategy.get_signal(&quote(100.0 + i as f64 * 0.1));
        }
        // A fresh symbol starts its own warmup.
        let mut other = quote(50.0);
        other.symbol = "EURUSD".to_string();
        assert_eq!(strategy.get_signal(&other).signal, Signal::Hold);
    }
}
