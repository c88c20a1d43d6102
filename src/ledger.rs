//! Position Ledger - simulated exchange
//!
//! Owns balance, equity, margin, and open positions; simulates fills with
//! spread and slippage and marks to market after every mutation. All book
//! state lives behind one lock and is mutated only here.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::core::config::AppConfig;
use crate::core::{AccountSnapshot, OrderRequest, OrderResult, Position, Quote, Result, Side};
use crate::feeds::PriceFetcher;
use crate::state::PersistedSnapshot;

/// Ledger simulation parameters.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub initial_balance: f64,
    pub simulated_spread: f64,
    pub simulated_slippage: f64,
    pub leverage_limit: f64,
    pub fill_latency: Duration,
}

impl LedgerSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            initial_balance: cfg.ledger.initial_balance,
            simulated_spread: cfg.ledger.simulated_spread,
            simulated_slippage: cfg.ledger.simulated_slippage,
            leverage_limit: cfg.risk.leverage_limit,
            fill_latency: Duration::from_millis(cfg.ledger.fill_latency_ms),
        }
    }
}

/// Book state guarded by the ledger lock.
struct LedgerBook {
    connected: bool,
    balance: f64,
    equity: f64,
    margin_used: f64,
    positions: HashMap<String, Position>,
    last_prices: HashMap<String, f64>,
}

impl LedgerBook {
    /// Re-mark every open position to the given mid, then refresh the
    /// derived account fields. Invariant: equity == balance + sum(pnl).
    fn mark_positions(&mut self, mid: f64, leverage_limit: f64) {
        let mut unrealized = 0.0;
        let mut margin = 0.0;
        for position in self.positions.values_mut() {
            position.pnl = (mid - position.entry) * position.size;
            unrealized += position.pnl;
            margin += (position.size * mid).abs() / leverage_limit;
        }
        self.margin_used = margin;
        self.equity = self.balance + unrealized;
    }

    fn unrealized(&self) -> f64 {
        self.positions.values().map(|p| p.pnl).sum()
    }
}

/// Paper-trading ledger: derives quotes from the raw fetcher and simulates
/// fills, margin, and PnL against a virtual account.
pub struct PaperLedger {
    settings: LedgerSettings,
    fetcher: Arc<dyn PriceFetcher>,
    book: RwLock<LedgerBook>,
}

impl PaperLedger {
    pub fn new(settings: LedgerSettings, fetcher: Arc<dyn PriceFetcher>) -> Self {
        let book = LedgerBook {
            connected: false,
            balance: settings.initial_balance,
            equity: settings.initial_balance,
            margin_used: 0.0,
            positions: HashMap::new(),
            last_prices: HashMap::new(),
        };
        Self {
            settings,
            fetcher,
            book: RwLock::new(book),
        }
    }

    /// Restore the book from a persisted snapshot at startup.
    pub fn restore(&self, snapshot: &PersistedSnapshot) {
        let mut book = self.book.write();
        book.balance = snapshot.balance;
        book.equity = snapshot.equity;
        book.margin_used = snapshot.margin_used;
        book.positions = snapshot.positions.clone();
    }

    /// Validate the data source with one fetch, then mark as connected.
    pub async fn connect(&self) -> Result<()> {
        self.fetcher.fetch().await?;
        self.book.write().connected = true;
        info!("Connected to paper ledger data feed");
        Ok(())
    }

    pub fn close(&self) {
        self.book.write().connected = false;
        info!("Paper ledger connection closed");
    }

    pub fn is_connected(&self) -> bool {
        self.book.read().connected
    }

    pub fn positions(&self) -> HashMap<String, Position> {
        self.book.read().positions.clone()
    }

    /// Account metrics re-marked from the last known mid.
    pub fn account_info(&self) -> AccountSnapshot {
        self.book_snapshot().0
    }

    /// Consistent view of the account and open positions under one lock,
    /// re-marked from the last known mid. The pair is taken atomically so a
    /// concurrent re-mark can never split equity from the position PnLs it
    /// was derived from.
    pub fn book_snapshot(&self) -> (AccountSnapshot, HashMap<String, Position>) {
        let mut book = self.book.write();
        if let Some(&mid) = book.last_prices.values().next() {
            let leverage = self.settings.leverage_limit;
            book.mark_positions(mid, leverage);
        }
        let unrealized = book.unrealized();
        book.equity = book.balance + unrealized;
        let account = AccountSnapshot {
            balance: book.balance,
            equity: book.equity,
            margin_used: book.margin_used,
            unrealized,
        };
        (account, book.positions.clone())
    }

    /// Fetch one bar and derive the next quote for `symbol`, marking all
    /// open positions to the new mid.
    pub async fn poll_quote(&self, symbol: &str) -> Result<Quote> {
        let candle = self.fetcher.fetch().await?;
        let mid = candle.close;
        let spread = self.settings.simulated_spread;

        let mut book = self.book.write();
        let last_mid = book.last_prices.get(symbol).copied().unwrap_or(mid);
        let volatility = if last_mid != 0.0 {
            (mid - last_mid).abs() / last_mid
        } else {
            0.0
        };
        book.last_prices.insert(symbol.to_string(), mid);
        let leverage = self.settings.leverage_limit;
        book.mark_positions(mid, leverage);

        Ok(Quote {
            symbol: symbol.to_string(),
            bid: mid - spread / 2.0,
            ask: mid + spread / 2.0,
            timestamp: chrono::Utc::now(),
            spread,
            volatility,
            open: Some(candle.open),
            high: Some(candle.high),
            low: Some(candle.low),
            close: Some(candle.close),
        })
    }

    /// Simulate a fill. Failures surface as rejected results; nothing
    /// escapes this boundary.
    pub async fn submit_order(&self, order: &OrderRequest) -> OrderResult {
        if !self.is_connected() {
            return OrderResult::rejected("Disconnected");
        }

        tokio::time::sleep(self.settings.fill_latency).await;

        let known_mid = self.book.read().last_prices.get(&order.symbol).copied();
        let mid = match known_mid {
            Some(m) => m,
            None => match self.fetcher.fetch().await {
                Ok(candle) => {
                    self.book
                        .write()
                        .last_prices
                        .insert(order.symbol.clone(), candle.close);
                    candle.close
                }
                Err(e) => return OrderResult::rejected(format!("Price unavailable: {e}")),
            },
        };

        let spread = self.settings.simulated_spread;
        let fill_price = match order.side {
            Side::Buy => mid + spread / 2.0 + self.settings.simulated_slippage,
            Side::Sell => mid - spread / 2.0 - self.settings.simulated_slippage,
        };
        let signed_size = order.size * order.side.sign();

        let mut book = self.book.write();
        let mut position = book.positions.get(&order.symbol).copied().unwrap_or(Position {
            size: 0.0,
            entry: fill_price,
            pnl: 0.0,
        });

        if position.size == 0.0 || position.size.signum() == signed_size.signum() {
            // New position or same-direction add: size-weighted average entry.
            let new_size = position.size + signed_size;
            if position.size != 0.0 {
                position.entry = (position.entry * position.size.abs()
                    + fill_price * signed_size.abs())
                    / new_size.abs();
            } else {
                position.entry = fill_price;
            }
            position.size = new_size;
        } else {
            // Reduce, close, or flip: realize PnL on the closing portion.
            // The residual leg takes the fill price as its new basis.
            let closing_size = position.size.abs().min(signed_size.abs());
            let realized = (fill_price - position.entry) * closing_size * position.size.signum();
            book.balance += realized;
            position.size += signed_size;
            position.entry = if position.size == 0.0 { 0.0 } else { fill_price };
        }

        position.pnl = (mid - position.entry) * position.size;
        if position.size == 0.0 {
            book.positions.remove(&order.symbol);
        } else {
            book.positions.insert(order.symbol.clone(), position);
        }
        let leverage = self.settings.leverage_limit;
        book.mark_positions(mid, leverage);
        drop(book);

        let order_id = format!("{}-{}", order.client_id, Uuid::new_v4());
        info!(
            "Order filled id={} side={} size={:.4} price={:.2} sl={:.2}",
            order_id, order.side, order.size, fill_price, order.stop_loss
        );
        OrderResult::filled(order.size, fill_price, order_id)
    }
}
