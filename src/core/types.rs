//! Core types - Strong typing for the trading pipeline
//!
//! Structured records replace the loosely-shaped account/position maps a
//! dynamic implementation would carry around. All monetary quantities are
//! `f64`; accounting identities are maintained by construction in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped bid/ask observation for a symbol, produced once per poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub timestamp: DateTime<Utc>,
    pub spread: f64,
    /// One-tick relative move, |mid - last_mid| / last_mid
    pub volatility: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1.0 for buys, -1.0 for sells
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Time-in-force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Ioc,
    Gtc,
}

/// Immutable order request, built only by the execution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub client_id: String,
}

/// Outcome of one submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub filled_size: f64,
    pub avg_price: Option<f64>,
    pub reason: Option<String>,
    pub order_id: Option<String>,
}

impl OrderResult {
    pub fn filled(size: f64, price: f64, order_id: String) -> Self {
        Self {
            success: true,
            filled_size: size,
            avg_price: Some(price),
            reason: None,
            order_id: Some(order_id),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            filled_size: 0.0,
            avg_price: None,
            reason: Some(reason.into()),
            order_id: None,
        }
    }

    /// Successful no-op, returned for HOLD decisions.
    pub fn no_action() -> Self {
        Self {
            success: true,
            filled_size: 0.0,
            avg_price: None,
            reason: Some("No action".to_string()),
            order_id: None,
        }
    }
}

/// Open position for one symbol. Size is signed; a position exists in the
/// ledger map iff size != 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub size: f64,
    pub entry: f64,
    pub pnl: f64,
}

/// Account metrics derived from the ledger book, recomputed on every mark.
/// Invariant: equity == balance + unrealized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub equity: f64,
    pub margin_used: f64,
    pub unrealized: f64,
}
