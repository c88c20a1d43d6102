//! Central configuration.
//!
//! Loads from `config.toml` at the project root, then applies environment
//! overrides. All trading parameters are runtime-configurable; invalid or
//! missing values fall back to defaults rather than aborting startup.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Trading surface: what to trade and how much to risk.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Symbols to stream (the first is the traded instrument)
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Fraction of equity risked per trade (e.g. 0.005 = 0.5%)
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    /// Client id prefix stamped on every order
    #[serde(default = "default_order_tag")]
    pub order_tag: String,
}

/// Hard risk limits enforced by the risk manager.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Daily loss fraction that halts trading (e.g. 0.02 = 2%)
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: f64,
    /// Peak-to-current drawdown fraction that halts trading
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,
    /// Aggregate notional cap, as a multiple of equity
    #[serde(default = "default_max_global_exposure")]
    pub max_global_exposure: f64,
    /// Per-symbol notional cap, as a multiple of equity
    #[serde(default = "default_max_symbol_exposure")]
    pub max_symbol_exposure: f64,
    #[serde(default = "default_leverage_limit")]
    pub leverage_limit: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: default_max_daily_loss(),
            max_drawdown: default_max_drawdown(),
            max_global_exposure: default_max_global_exposure(),
            max_symbol_exposure: default_max_symbol_exposure(),
            leverage_limit: default_leverage_limit(),
        }
    }
}

/// Pre-trade market filters applied by the execution pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Reject orders when the quoted spread exceeds this (price units)
    #[serde(default = "default_spread_limit")]
    pub spread_limit: f64,
    /// Reject orders when one-tick volatility exceeds this fraction
    #[serde(default = "default_volatility_limit")]
    pub volatility_limit: f64,
}

/// Quote transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// JSON OHLC endpoint; when absent the synthetic random walk is used
    #[serde(default)]
    pub url: Option<String>,
    /// Seconds between polls of the raw source
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    /// Starting price for the synthetic walk
    #[serde(default = "default_synthetic_start")]
    pub synthetic_start: f64,
}

/// Paper ledger (simulated exchange) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    /// Simulated bid/ask spread around the market mid (price units)
    #[serde(default = "default_simulated_spread")]
    pub simulated_spread: f64,
    /// Slippage added per fill in the trade direction (price units)
    #[serde(default = "default_simulated_slippage")]
    pub simulated_slippage: f64,
    /// Simulated order round-trip latency
    #[serde(default = "default_fill_latency_ms")]
    pub fill_latency_ms: u64,
}

/// Engine lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// First reconnect delay, doubled per attempt (seconds)
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_secs: f64,
    /// Reconnect delay ceiling (seconds)
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: f64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Bounded run length; runs until interrupted when absent
    #[serde(default)]
    pub runtime_secs: Option<f64>,
}

fn default_symbols() -> Vec<String> {
    vec!["XAUUSD".to_string()]
}
fn default_risk_per_trade() -> f64 {
    0.005
}
fn default_order_tag() -> String {
    "QG-001".to_string()
}
fn default_max_daily_loss() -> f64 {
    0.02
}
fn default_max_drawdown() -> f64 {
    0.1
}
fn default_max_global_exposure() -> f64 {
    2.0
}
fn default_max_symbol_exposure() -> f64 {
    1.0
}
fn default_leverage_limit() -> f64 {
    20.0
}
fn default_spread_limit() -> f64 {
    0.5
}
fn default_volatility_limit() -> f64 {
    0.02
}
fn default_poll_interval() -> f64 {
    5.0
}
fn default_synthetic_start() -> f64 {
    2000.0
}
fn default_initial_balance() -> f64 {
    30_000.0
}
fn default_simulated_spread() -> f64 {
    0.2
}
fn default_simulated_slippage() -> f64 {
    0.05
}
fn default_fill_latency_ms() -> u64 {
    25
}
fn default_reconnect_base() -> f64 {
    1.0
}
fn default_reconnect_max() -> f64 {
    30.0
}
fn default_state_file() -> String {
    "state.json".to_string()
}

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub feed: FeedConfig,
    pub ledger: LedgerConfig,
    pub engine: EngineConfig,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            risk_per_trade: default_risk_per_trade(),
            order_tag: default_order_tag(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            spread_limit: default_spread_limit(),
            volatility_limit: default_volatility_limit(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_interval_secs: default_poll_interval(),
            synthetic_start: default_synthetic_start(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            simulated_spread: default_simulated_spread(),
            simulated_slippage: default_simulated_slippage(),
            fill_latency_ms: default_fill_latency_ms(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_base_secs: default_reconnect_base(),
            reconnect_max_secs: default_reconnect_max(),
            state_file: default_state_file(),
            runtime_secs: None,
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the default locations (project root config.toml).
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            if let Ok(cfg) = Self::load(Path::new(path)) {
                tracing::info!("Loaded config from {}", path);
                return cfg;
            }
        }

        tracing::warn!("No config.toml found, using defaults");
        Self::default()
    }

    /// Apply environment overrides on top of the file values. Unparsable
    /// values keep whatever the file (or default) provided.
    pub fn with_env_overrides(mut self) -> Self {
        env_list("SYMBOLS", &mut self.trading.symbols);
        env_f64("RISK_PER_TRADE", &mut self.trading.risk_per_trade);
        env_str("ORDER_TAG", &mut self.trading.order_tag);
        env_f64("MAX_DAILY_LOSS", &mut self.risk.max_daily_loss);
        env_f64("MAX_DRAWDOWN", &mut self.risk.max_drawdown);
        env_f64("MAX_GLOBAL_EXPOSURE", &mut self.risk.max_global_exposure);
        env_f64("MAX_SYMBOL_EXPOSURE", &mut self.risk.max_symbol_exposure);
        env_f64("LEVERAGE_LIMIT", &mut self.risk.leverage_limit);
        env_f64("SPREAD_LIMIT", &mut self.execution.spread_limit);
        env_f64("VOLATILITY_LIMIT", &mut self.execution.volatility_limit);
        env_f64("DATA_POLL_INTERVAL", &mut self.feed.poll_interval_secs);
        env_f64("SIMULATED_SPREAD", &mut self.ledger.simulated_spread);
        env_f64("SIMULATED_SLIPPAGE", &mut self.ledger.simulated_slippage);
        env_f64("INITIAL_BALANCE", &mut self.ledger.initial_balance);
        env_f64("RECONNECT_BASE", &mut self.engine.reconnect_base_secs);
        env_f64("RECONNECT_MAX", &mut self.engine.reconnect_max_secs);
        env_str("STATE_FILE", &mut self.engine.state_file);
        if let Ok(raw) = std::env::var("FEED_URL") {
            if !raw.is_empty() {
                self.feed.url = Some(raw);
            }
        }
        if let Ok(raw) = std::env::var("RUNTIME_SECS") {
            if let Ok(v) = raw.parse::<f64>() {
                self.engine.runtime_secs = Some(v);
            }
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.feed.poll_interval_secs.max(0.0))
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_secs_f64(self.engine.reconnect_base_secs.max(0.0))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs_f64(self.engine.reconnect_max_secs.max(0.0))
    }
}

fn env_f64(name: &str, slot: &mut f64) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<f64>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!("Ignoring invalid {}={}", name, raw),
        }
    }
}

fn env_str(name: &str, slot: &mut String) {
    if let Ok(raw) = std::env::var(name) {
        if !raw.is_empty() {
            *slot = raw;
        }
    }
}

fn env_list(name: &str, slot: &mut Vec<String>) {
    if let Ok(raw) = std::env::var(name) {
        let items: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !items.is_empty() {
            *slot = items;
        }
    }
}
