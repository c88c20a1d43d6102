//! End-to-end pipeline tests over the synthetic feed.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use quantgate::core::Quote;
use quantgate::engine::{EngineSettings, EngineState, TradingEngine};
use quantgate::execution::{ExecutionFilters, OrderHandler};
use quantgate::feeds::SyntheticFetcher;
use quantgate::ledger::{LedgerSettings, PaperLedger};
use quantgate::risk::{RiskLimits, RiskManager};
use quantgate::state::StateStore;
use quantgate::strategies::{Decision, Signal, Strategy, TrendFollowing};

/// Fires one BUY with a 20-point stop on the first quote, then holds.
struct OneShotBuy {
    fired: bool,
}

impl Strategy for OneShotBuy {
    fn name(&self) -> &str {
        "one_shot_buy"
    }

    fn get_signal(&mut self, quote: &Quote) -> Decision {
        if self.fired {
            return Decision::hold();
        }
        self.fired = true;
        Decision {
            signal: Signal::Buy,
            stop_loss: Some(quote.ask - 20.0),
            take_profit: None,
        }
    }
}

struct Harness {
    store: Arc<StateStore>,
    engine: Arc<TradingEngine>,
    _dir: tempfile::TempDir,
}

fn harness(strategy: Box<dyn Strategy>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(SyntheticFetcher::with_seed(2000.0, 42));
    let settings = LedgerSettings {
        initial_balance: 30_000.0,
        simulated_spread: 0.2,
        simulated_slippage: 0.05,
        leverage_limit: 20.0,
        fill_latency: Duration::from_millis(0),
    };
    let ledger = Arc::new(PaperLedger::new(settings, fetcher));
    let risk = Arc::new(Mutex::new(RiskManager::new(RiskLimits::default())));
    let handler = OrderHandler::new(
        ledger.clone(),
        risk.clone(),
        ExecutionFilters {
            spread_limit: 0.5,
            volatility_limit: 0.02,
            order_tag: "TEST".to_string(),
        },
    );
    let store = Arc::new(StateStore::new(dir.path().join("state.json"), 30_000.0));
    let engine = TradingEngine::new(
        ledger,
        strategy,
        risk,
        handler,
        store.clone(),
        EngineSettings {
            symbols: vec!["XAUUSD".to_string()],
            poll_interval: Duration::from_millis(5),
            reconnect_base: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(50),
        },
    );
    Harness {
        store,
        engine,
        _dir: dir,
    }
}

#[tokio::test]
async fn bounded_run_reaches_stopped_with_consistent_checkpoint() {
    let h = harness(Box::new(TrendFollowing::default()));

    h.engine
        .clone()
        .run(Some(Duration::from_millis(400)))
        .await
        .unwrap();

    assert_eq!(h.engine.state(), EngineState::Stopped);
    let snapshot = h.store.load().await;
    let pnl_sum: f64 = snapshot.positions.values().map(|p| p.pnl).sum();
    assert!((snapshot.equity - (snapshot.balance + pnl_sum)).abs() < 1e-6);
    assert!((snapshot.unrealized - pnl_sum).abs() < 1e-6);
}

#[tokio::test]
async fn executed_order_is_risk_sized_and_checkpointed() {
    let h = harness(Box::new(OneShotBuy { fired: false }));

    h.engine
        .clone()
        .run(Some(Duration::from_millis(400)))
        .await
        .unwrap();

    let snapshot = h.store.load().await;
    let position = snapshot
        .positions
        .get("XAUUSD")
        .expect("the one-shot buy should leave an open position");
    // size = equity * risk_per_trade / stop_distance = 30000 * 0.005 / 20
    assert!((position.size - 7.5).abs() < 1e-6);
    // No close happened, so balance is untouched.
    assert!((snapshot.balance - 30_000.0).abs() < 1e-6);
    assert_eq!(snapshot.daily_start_equity, Some(30_000.0));
}

#[tokio::test]
async fn restart_restores_risk_baselines_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = StateStore::new(path.clone(), 30_000.0);
    let mut snapshot = store.default_snapshot();
    snapshot.daily_start_equity = Some(29_500.0);
    snapshot.equity_peak = Some(30_500.0);
    store.persist(&snapshot).await.unwrap();

    let h = {
        let fetcher = Arc::new(SyntheticFetcher::with_seed(2000.0, 7));
        let settings = LedgerSettings {
            initial_balance: 30_000.0,
            simulated_spread: 0.2,
            simulated_slippage: 0.05,
            leverage_limit: 20.0,
            fill_latency: Duration::from_millis(0),
        };
        let ledger = Arc::new(PaperLedger::new(settings, fetcher));
        let risk = Arc::new(Mutex::new(RiskManager::new(RiskLimits::default())));
        let handler = OrderHandler::new(
            ledger.clone(),
            risk.clone(),
            ExecutionFilters {
                spread_limit: 0.5,
                volatility_limit: 0.02,
                order_tag: "TEST".to_string(),
            },
        );
        let store = Arc::new(StateStore::new(path.clone(), 30_000.0));
        TradingEngine::new(
            ledger,
            Box::new(TrendFollowing::default()),
            risk,
            handler,
            store,
            EngineSettings {
                symbols: vec!["XAUUSD".to_string()],
                poll_interval: Duration::from_millis(5),
                reconnect_base: Duration::from_millis(10),
                reconnect_max: Duration::from_millis(50),
            },
        )
    };

    h.clone().run(Some(Duration::from_millis(200))).await.unwrap();

    // The final checkpoint carries the restored baselines forward (no
    // rollover happened within the run).
    let store = StateStore::new(path, 30_000.0);
    let reloaded = store.load().await;
    assert_eq!(reloaded.daily_start_equity, Some(29_500.0));
    assert_eq!(reloaded.equity_peak, Some(30_500.0));
}
