//! Error handling - Hierarchical errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// QuantGate error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Quote fetch failures - transient, handled by reconnect
    #[error("Feed: {0}")]
    Feed(String),

    /// Broker/ledger errors
    #[error("Broker: {0}")]
    Broker(String),

    /// Persisted state errors
    #[error("State: {0}")]
    State(String),

    /// Network/IO errors
    #[error("Network: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization
    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),
}
