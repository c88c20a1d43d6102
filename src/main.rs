use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use quantgate::core::AppConfig;
use quantgate::engine::{EngineSettings, TradingEngine};
use quantgate::execution::{ExecutionFilters, OrderHandler};
use quantgate::feeds::{PriceFetcher, RestFetcher, SyntheticFetcher};
use quantgate::ledger::{LedgerSettings, PaperLedger};
use quantgate::risk::{RiskLimits, RiskManager};
use quantgate::state::StateStore;
use quantgate::strategies::TrendFollowing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,quantgate=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();

    let config = AppConfig::load_default().with_env_overrides();
    tracing::info!("QuantGate starting (risk-gated paper trading engine)...");

    let fetcher: Arc<dyn PriceFetcher> = match &config.feed.url {
        Some(url) => {
            tracing::info!("Polling REST feed {}", url);
            Arc::new(RestFetcher::new(url.clone()))
        }
        None => {
            tracing::info!(
                "No feed URL configured; using synthetic walk from {}",
                config.feed.synthetic_start
            );
            Arc::new(SyntheticFetcher::new(config.feed.synthetic_start))
        }
    };

    let store = Arc::new(StateStore::new(
        config.engine.state_file.clone().into(),
        config.ledger.initial_balance,
    ));
    let ledger = Arc::new(PaperLedger::new(
        LedgerSettings::from_config(&config),
        fetcher,
    ));
    let risk = Arc::new(Mutex::new(RiskManager::new(RiskLimits::from_config(
        &config,
    ))));
    let handler = OrderHandler::new(
        ledger.clone(),
        risk.clone(),
        ExecutionFilters::from_config(&config),
    );
    let engine = TradingEngine::new(
        ledger,
        Box::new(TrendFollowing::default()),
        risk,
        handler,
        store,
        EngineSettings::from_config(&config),
    );

    let runtime = config.engine.runtime_secs.map(Duration::from_secs_f64);
    tokio::select! {
        result = engine.clone().run(runtime) => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received; shutting down");
            engine.stop().await;
            Ok(())
        }
    }
}
