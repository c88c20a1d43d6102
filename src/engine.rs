//! Trading Engine
//!
//! Orchestrates the pipeline: a producer polls the ledger's quote stream
//! into a bounded queue, a consumer runs strategy + execution per quote in
//! FIFO order, and a health monitor watches connectivity, queue pressure,
//! and checkpoint freshness. All three tasks share one cancellation flag
//! and drain cooperatively on stop.

use chrono::Local;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::AppConfig;
use crate::core::{AccountSnapshot, Position, Quote, Result};
use crate::execution::OrderHandler;
use crate::ledger::PaperLedger;
use crate::risk::RiskManager;
use crate::state::{PersistedSnapshot, StateStore};
use crate::strategies::{Signal, Strategy};
use crate::util::{compute_backoff, Shutdown};

/// Bounded quote queue; the producer suspends when full, so backpressure
/// propagates to the poll loop and no quote is ever dropped.
const QUEUE_CAPACITY: usize = 1000;
/// Queue depth above which the health monitor warns.
const PRESSURE_DEPTH: usize = 500;
/// Health monitor cadence.
const HEALTH_INTERVAL: Duration = Duration::from_secs(1);
/// Force a checkpoint when the last one is older than this.
const CHECKPOINT_STALE: Duration = Duration::from_secs(5);

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    Connecting,
    Running,
    Stopping,
    Stopped,
}

/// Engine lifecycle settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbols: Vec<String>,
    pub poll_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            symbols: cfg.trading.symbols.clone(),
            poll_interval: cfg.poll_interval(),
            reconnect_base: cfg.reconnect_base(),
            reconnect_max: cfg.reconnect_max(),
        }
    }
}

/// Coordinates data, risk checks, execution, and persistence.
pub struct TradingEngine {
    ledger: Arc<PaperLedger>,
    strategy: Mutex<Box<dyn Strategy>>,
    risk: Arc<Mutex<RiskManager>>,
    handler: OrderHandler,
    store: Arc<StateStore>,
    settings: EngineSettings,
    shutdown: Shutdown,
    state: Mutex<EngineState>,
    snapshot: Mutex<PersistedSnapshot>,
    last_checkpoint: Mutex<Instant>,
    queue_tx: Mutex<Option<mpsc::Sender<Quote>>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl TradingEngine {
    pub fn new(
        ledger: Arc<PaperLedger>,
        strategy: Box<dyn Strategy>,
        risk: Arc<Mutex<RiskManager>>,
        handler: OrderHandler,
        store: Arc<StateStore>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let snapshot = store.default_snapshot();
        Arc::new(Self {
            ledger,
            strategy: Mutex::new(strategy),
            risk,
            handler,
            store,
            settings,
            shutdown: Shutdown::new(),
            state: Mutex::new(EngineState::Init),
            snapshot: Mutex::new(snapshot),
            last_checkpoint: Mutex::new(Instant::now()),
            queue_tx: Mutex::new(None),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    /// Run the pipeline, bounded when a duration is given. Restores
    /// persisted state, connects with backoff, then schedules the producer,
    /// consumer, and health monitor.
    pub async fn run(self: Arc<Self>, runtime: Option<Duration>) -> Result<()> {
        let persisted = self.store.load().await;
        self.risk
            .lock()
            .restore(persisted.daily_start_equity, persisted.equity_peak);
        self.ledger.restore(&persisted);
        *self.snapshot.lock() = persisted;

        self.set_state(EngineState::Connecting);
        self.connect_with_backoff().await;

        let (tx, rx) = mpsc::channel::<Quote>(QUEUE_CAPACITY);
        *self.queue_tx.lock() = Some(tx.clone());
        {
            let mut tasks = self.tasks.lock().await;
            let producer = Arc::clone(&self);
            tasks.push(tokio::spawn(async move { producer.producer_loop(tx).await }));
            let consumer = Arc::clone(&self);
            tasks.push(tokio::spawn(async move { consumer.consumer_loop(rx).await }));
            let monitor = Arc::clone(&self);
            tasks.push(tokio::spawn(async move { monitor.health_monitor().await }));
        }
        self.set_state(EngineState::Running);
        info!("Engine running: producer, consumer, and health monitor scheduled");

        match runtime {
            Some(duration) => {
                self.shutdown.resilient_sleep(duration).await;
                self.stop().await;
            }
            None => {
                self.shutdown.cancelled().await;
                self.stop().await;
            }
        }
        Ok(())
    }

    /// Cancel all activities, await their drain, close the ledger, and take
    /// a final checkpoint. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, EngineState::Stopping | EngineState::Stopped) {
                return;
            }
            *state = EngineState::Stopping;
        }

        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Engine task failed: {e}");
                }
            }
        }
        drop(tasks);

        self.ledger.close();
        self.checkpoint().await;
        self.set_state(EngineState::Stopped);
        info!("Engine stopped gracefully");
    }

    async fn connect_with_backoff(&self) {
        let mut attempt: u32 = 0;
        while !self.ledger.is_connected() && !self.shutdown.is_cancelled() {
            match self.ledger.connect().await {
                Ok(()) => return,
                Err(e) => {
                    let delay = compute_backoff(
                        attempt,
                        self.settings.reconnect_base,
                        self.settings.reconnect_max,
                    );
                    error!(
                        "Broker connection failed ({e}). Retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    attempt += 1;
                    self.shutdown.resilient_sleep(delay).await;
                }
            }
        }
    }

    /// Poll quotes into the bounded queue. Feed errors trigger reconnection
    /// with backoff without terminating the engine.
    async fn producer_loop(self: Arc<Self>, tx: mpsc::Sender<Quote>) {
        let symbol = self
            .settings
            .symbols
            .first()
            .cloned()
            .unwrap_or_else(|| "XAUUSD".to_string());

        while !self.shutdown.is_cancelled() {
            match self.ledger.poll_quote(&symbol).await {
                Ok(quote) => {
                    tokio::select! {
                        sent = tx.send(quote) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                        _ = self.shutdown.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!("Price stream error: {e}");
                    self.connect_with_backoff().await;
                }
            }
            self.shutdown.resilient_sleep(self.settings.poll_interval).await;
        }
    }

    /// Drain quotes in production order.
    async fn consumer_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Quote>) {
        loop {
            let quote = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                quote = rx.recv() => match quote {
                    Some(quote) => quote,
                    None => break,
                },
            };
            if let Err(e) = self.handle_quote(quote).await {
                // Isolate per-quote failures; the pipeline continues.
                error!("Quote handling failed: {e}");
            }
        }
    }

    async fn handle_quote(&self, quote: Quote) -> Result<()> {
        let (account, positions) = self.ledger.book_snapshot();

        let today = Local::now().date_naive();
        let rolled_over = {
            let mut snapshot = self.snapshot.lock();
            if snapshot.trading_day != today {
                snapshot.trading_day = today;
                true
            } else {
                false
            }
        };
        if rolled_over {
            self.risk.lock().reset_day(account.equity);
        }

        self.refresh_snapshot(&account, &positions);

        let decision = self.strategy.lock().get_signal(&quote);
        if decision.signal == Signal::Hold {
            return Ok(());
        }

        let result = self
            .handler
            .execute(&quote, &decision, &account, &positions)
            .await;
        if result.success {
            // Re-capture the book the fill just mutated, then checkpoint.
            let (account, positions) = self.ledger.book_snapshot();
            self.refresh_snapshot(&account, &positions);
            self.checkpoint().await;
        }
        Ok(())
    }

    /// Reconnect when disconnected, warn on queue pressure, and force a
    /// checkpoint when the last one has gone stale.
    async fn health_monitor(self: Arc<Self>) {
        while !self.shutdown.is_cancelled() {
            if !self.ledger.is_connected() {
                warn!("Broker disconnected; attempting reconnection");
                self.connect_with_backoff().await;
            }

            let depth = self.queue_depth();
            if depth > PRESSURE_DEPTH {
                warn!("Price queue pressure detected depth={depth}");
            }

            let stale = self.last_checkpoint.lock().elapsed() > CHECKPOINT_STALE;
            if stale {
                self.checkpoint().await;
            }

            self.shutdown.resilient_sleep(HEALTH_INTERVAL).await;
        }
    }

    fn queue_depth(&self) -> usize {
        self.queue_tx
            .lock()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    fn refresh_snapshot(&self, account: &AccountSnapshot, positions: &HashMap<String, Position>) {
        let (daily_start, peak) = {
            let risk = self.risk.lock();
            (risk.daily_start_equity(), risk.equity_peak())
        };
        let mut snapshot = self.snapshot.lock();
        snapshot.balance = account.balance;
        snapshot.equity = account.equity;
        snapshot.margin_used = account.margin_used;
        snapshot.unrealized = account.unrealized;
        snapshot.positions = positions.clone();
        snapshot.daily_start_equity = daily_start;
        snapshot.equity_peak = peak;
    }

    async fn checkpoint(&self) {
        let snapshot = self.snapshot.lock().clone();
        match self.store.persist(&snapshot).await {
            Ok(()) => *self.last_checkpoint.lock() = Instant::now(),
            Err(e) => error!("Checkpoint failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionFilters;
    use crate::feeds::FixedFetcher;
    use crate::ledger::LedgerSettings;
    use crate::risk::RiskLimits;
    use crate::strategies::TrendFollowing;

    fn test_engine(dir: &std::path::Path) -> (Arc<StateStore>, Arc<TradingEngine>) {
        let fetcher = Arc::new(FixedFetcher::new(2000.0));
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
        let store = Arc::new(StateStore::new(dir.join("state.json"), 30_000.0));
        let engine = TradingEngine::new(
            ledger,
            Box::new(TrendFollowing::default()),
            risk,
            handler,
            store.clone(),
            EngineSettings {
                symbols: vec!["XAUUSD".to_string()],
                poll_interval: Duration::from_millis(2),
                reconnect_base: Duration::from_millis(10),
                reconnect_max: Duration::from_millis(50),
            },
        );
        (store, engine)
    }

    #[test]
    fn starts_in_init_state() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, engine) = test_engine(dir.path());
        assert_eq!(engine.state(), EngineState::Init);
    }

    #[tokio::test]
    async fn bounded_run_stops_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let (store, engine) = test_engine(dir.path());

        engine
            .clone()
            .run(Some(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(dir.path().join("state.json").exists());
        let snapshot = store.load().await;
        let pnl_sum: f64 = snapshot.positions.values().map(|p| p.pnl).sum();
        assert!((snapshot.equity - (snapshot.balance + pnl_sum)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn full_queue_suspends_the_producer_without_drops() {
        let (tx, mut rx) = mpsc::channel::<usize>(QUEUE_CAPACITY);
        for i in 0..QUEUE_CAPACITY {
            tx.send(i).await.unwrap();
        }

        // The next push cannot complete until the consumer drains.
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), tx.send(QUEUE_CAPACITY)).await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await, Some(0));
        tokio::time::timeout(Duration::from_millis(200), tx.send(QUEUE_CAPACITY))
            .await
            .expect("send should complete after drain")
            .unwrap();

        let mut drained = Vec::new();
        while let Ok(v) = rx.try_recv() {
            drained.push(v);
        }
        assert_eq!(drained.len(), QUEUE_CAPACITY);
        assert!(drained.windows(2).all(|w| w[0] < w[1]));
    }
}
