//! Risk Manager - hard limits between strategy decisions and the ledger
//!
//! Every order passes through `validate_order`; there is no other path to
//! submission. Rejections are tagged values the caller must branch on.

use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::{AccountSnapshot, Position, Side};

/// Enumerated rejection reasons, evaluated in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RiskViolation {
    #[error("Daily loss limit reached; trading halted")]
    DailyLossLimitReached,

    #[error("Max drawdown breached; trading halted")]
    MaxDrawdownBreached,

    #[error("Stop distance must be positive")]
    InvalidStopDistance,

    #[error("Computed size is zero; reject order")]
    ZeroSize,

    #[error("Insufficient margin for order")]
    InsufficientMargin,

    #[error("Per-symbol exposure limit exceeded")]
    SymbolExposureExceeded,

    #[error("Global exposure limit exceeded")]
    GlobalExposureExceeded,
}

/// Risk configuration limits.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Fraction of equity risked per trade
    pub risk_per_trade: f64,
    /// Daily loss fraction that halts trading
    pub max_daily_loss: f64,
    /// Peak-to-current drawdown fraction that halts trading
    pub max_drawdown: f64,
    /// Aggregate notional cap as a multiple of equity
    pub max_global_exposure: f64,
    /// Per-symbol notional cap as a multiple of equity
    pub max_symbol_exposure: f64,
    pub leverage_limit: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.005,
            max_daily_loss: 0.02,
            max_drawdown: 0.1,
            max_global_exposure: 2.0,
            max_symbol_exposure: 1.0,
            leverage_limit: 20.0,
        }
    }
}

impl RiskLimits {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            risk_per_trade: cfg.trading.risk_per_trade,
            max_daily_loss: cfg.risk.max_daily_loss,
            max_drawdown: cfg.risk.max_drawdown,
            max_global_exposure: cfg.risk.max_global_exposure,
            max_symbol_exposure: cfg.risk.max_symbol_exposure,
            leverage_limit: cfg.risk.leverage_limit,
        }
    }
}

/// Everything the gate needs to know about a prospective order.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub spread: f64,
    pub volatility: f64,
}

/// Stateful gatekeeper: circuit breakers, position sizing, exposure limits.
pub struct RiskManager {
    limits: RiskLimits,
    daily_start_equity: Option<f64>,
    equity_peak: Option<f64>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            daily_start_equity: None,
            equity_peak: None,
        }
    }

    /// Restore circuit-breaker baselines from a persisted snapshot.
    pub fn restore(&mut self, daily_start_equity: Option<f64>, equity_peak: Option<f64>) {
        self.daily_start_equity = daily_start_equity;
        self.equity_peak = equity_peak;
    }

    /// Re-seed both baselines on a calendar-day rollover.
    pub fn reset_day(&mut self, equity: f64) {
        self.daily_start_equity = Some(equity);
        self.equity_peak = Some(equity);
        info!("Trading day rollover; risk baselines reset to equity={equity:.2}");
    }

    pub fn daily_start_equity(&self) -> Option<f64> {
        self.daily_start_equity
    }

    pub fn equity_peak(&self) -> Option<f64> {
        self.equity_peak
    }

    /// Return the approved position size if every rule passes.
    pub fn validate_order(
        &mut self,
        ctx: &OrderContext,
        account: &AccountSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Result<f64, RiskViolation> {
        self.check_circuit_breakers(account.equity)?;

        let stop_distance = (ctx.price - ctx.stop_loss).abs();
        let size = self.position_size(account.equity, stop_distance)?;
        if size <= 0.0 {
            return Err(RiskViolation::ZeroSize);
        }

        self.check_exposure(&ctx.symbol, ctx.price, size, account, positions)?;
        Ok(size)
    }

    fn check_circuit_breakers(&mut self, equity: f64) -> Result<(), RiskViolation> {
        if self.daily_start_equity.is_none() {
            self.daily_start_equity = Some(equity);
            self.equity_peak = Some(equity);
        }
        let daily_start = self.daily_start_equity.unwrap_or(equity);
        let peak = self.equity_peak.unwrap_or(equity).max(equity);
        self.equity_peak = Some(peak);

        if equity <= daily_start * (1.0 - self.limits.max_daily_loss) {
            return Err(RiskViolation::DailyLossLimitReached);
        }
        if equity <= peak * (1.0 - self.limits.max_drawdown) {
            return Err(RiskViolation::MaxDrawdownBreached);
        }
        Ok(())
    }

    fn position_size(&self, equity: f64, stop_distance: f64) -> Result<f64, RiskViolation> {
        if stop_distance <= 0.0 {
            return Err(RiskViolation::InvalidStopDistance);
        }
        let risk_amount = equity * self.limits.risk_per_trade;
        Ok((risk_amount / stop_distance).max(0.0))
    }

    fn check_exposure(
        &self,
        symbol: &str,
        price: f64,
        size: f64,
        account: &AccountSnapshot,
        positions: &HashMap<String, Position>,
    ) -> Result<(), RiskViolation> {
        let notional = price * size;

        let projected_margin = account.margin_used + notional / self.limits.leverage_limit;
        if projected_margin > account.equity {
            return Err(RiskViolation::InsufficientMargin);
        }

        // Existing exposure is marked at the incoming order's price.
        let symbol_notional = positions
            .get(symbol)
            .map(|p| (p.size * price).abs())
            .unwrap_or(0.0);
        if symbol_notional + notional > account.equity * self.limits.max_symbol_exposure {
            return Err(RiskViolation::SymbolExposureExceeded);
        }

        let aggregate_notional: f64 = positions.values().map(|p| (p.size * price).abs()).sum();
        if aggregate_notional + notional > account.equity * self.limits.max_global_exposure {
            return Err(RiskViolation::GlobalExposureExceeded);
        }

        Ok(())
    }
}
