//! Order Execution Pipeline
//!
//! Turns a strategy decision into at most one ledger submission: market
//! filters, stop-side sanity, the risk gate, then order construction. Every
//! rejection comes back as a failed OrderResult; nothing escapes this layer.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::config::AppConfig;
use crate::core::{
    AccountSnapshot, OrderRequest, OrderResult, OrderType, Position, Quote, Side, TimeInForce,
};
use crate::ledger::PaperLedger;
use crate::risk::{OrderContext, RiskManager};
use crate::strategies::{Decision, Signal};

/// Pre-trade market filters.
#[derive(Debug, Clone)]
pub struct ExecutionFilters {
    pub spread_limit: f64,
    pub volatility_limit: f64,
    /// Client id prefix stamped on every order
    pub order_tag: String,
}

impl ExecutionFilters {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            spread_limit: cfg.execution.spread_limit,
            volatility_limit: cfg.execution.volatility_limit,
            order_tag: cfg.trading.order_tag.clone(),
        }
    }
}

/// Executes broker-safe orders with mandatory stop-loss and filters.
pub struct OrderHandler {
    ledger: Arc<PaperLedger>,
    risk: Arc<Mutex<RiskManager>>,
    filters: ExecutionFilters,
}

impl OrderHandler {
    pub fn new(
        ledger: Arc<PaperLedger>,
        risk: Arc<Mutex<RiskManager>>,
        filters: ExecutionFilters,
    ) -> Self {
        Self {
            ledger,
            risk,
            filters,
        }
    }

    /// One attempt per quote; no retry at this layer.
    pub async fn execute(
        &self,
        quote: &Quote,
        decision: &Decision,
        account: &AccountSnapshot,
        positions: &HashMap<String, Position>,
    ) -> OrderResult {
        if decision.signal == Signal::Hold {
            return OrderResult::no_action();
        }

        let stop_loss = match decision.stop_loss {
            Some(stop) => stop,
            None => return OrderResult::rejected("Stop-loss required"),
        };

        if quote.spread > self.filters.spread_limit {
            return OrderResult::rejected("Spread too wide");
        }
        if quote.volatility > self.filters.volatility_limit {
            return OrderResult::rejected("Volatility too high");
        }

        let side = if decision.signal == Signal::Buy {
            Side::Buy
        } else {
            Side::Sell
        };
        let price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };

        if side == Side::Buy && stop_loss >= price {
            return OrderResult::rejected("Stop-loss must be below entry for BUY");
        }
        if side == Side::Sell && stop_loss <= price {
            return OrderResult::rejected("Stop-loss must be above entry for SELL");
        }

        let ctx = OrderContext {
            symbol: quote.symbol.clone(),
            side,
            price,
            stop_loss,
            take_profit: decision.take_profit,
            spread: quote.spread,
            volatility: quote.volatility,
        };

        let size = match self.risk.lock().validate_order(&ctx, account, positions) {
            Ok(size) => size,
            Err(violation) => {
                warn!("Order rejected by risk manager: {violation}");
                return OrderResult::rejected(violation.to_string());
            }
        };

        let order = OrderRequest {
            symbol: quote.symbol.clone(),
            side,
            size,
            price,
            stop_loss,
            take_profit: decision.take_profit,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Ioc,
            client_id: self.filters.order_tag.clone(),
        };

        let result = self.ledger.submit_order(&order).await;
        if !result.success {
            error!("Order submission failed: {:?}", result.reason);
            return result;
        }

        info!(
            "Order executed side={} size={:.4} price={:.5} sl={:.5} tp={:?}",
            side,
            result.filled_size,
            result.avg_price.unwrap_or(price),
            stop_loss,
            decision.take_profit,
        );
        result
    }
}
