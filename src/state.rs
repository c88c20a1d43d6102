//! State Store - crash-consistent persistence
//!
//! One JSON snapshot is the source of truth across restarts. Writes go to a
//! temporary sibling and are renamed into place, so readers never observe a
//! torn file. A single lock serializes access; both the consumer and the
//! health monitor checkpoint through here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::error;

use crate::core::{Position, Result};

/// Durable snapshot of engine/risk/ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub positions: HashMap<String, Position>,
    pub equity: f64,
    pub balance: f64,
    pub unrealized: f64,
    pub margin_used: f64,
    #[serde(default)]
    pub daily_start_equity: Option<f64>,
    #[serde(default)]
    pub equity_peak: Option<f64>,
    pub trading_day: NaiveDate,
}

/// Durable state for restart continuity.
pub struct StateStore {
    path: PathBuf,
    initial_balance: f64,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: PathBuf, initial_balance: f64) -> Self {
        Self {
            path,
            initial_balance,
            lock: Mutex::new(()),
        }
    }

    /// Fresh-start snapshot: initial balance, no positions, today's date.
    pub fn default_snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            positions: HashMap::new(),
            equity: self.initial_balance,
            balance: self.initial_balance,
            unrealized: 0.0,
            margin_used: 0.0,
            daily_start_equity: Some(self.initial_balance),
            equity_peak: Some(self.initial_balance),
            trading_day: chrono::Local::now().date_naive(),
        }
    }

    /// Load the persisted snapshot. Absence and corruption both fall back to
    /// the default snapshot; corruption is logged, never fatal.
    pub async fn load(&self) -> PersistedSnapshot {
        let _guard = self.lock.lock().await;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(_) => return self.default_snapshot(),
        };
        match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("State file corrupted ({e}); falling back to defaults");
                self.default_snapshot()
            }
        }
    }

    /// Serialize and atomically replace the canonical file.
    pub async fn persist(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(store: &StateStore) -> PersistedSnapshot {
        let mut snapshot = store.default_snapshot();
        snapshot.positions.insert(
            "XAUUSD".to_string(),
            Position {
                size: 15.0,
                entry: 2000.15,
                pnl: -2.25,
            },
        );
        snapshot.balance = 30_100.0;
        snapshot.unrealized = -2.25;
        snapshot.equity = 30_097.75;
        snapshot.margin_used = 1500.0;
        snapshot.daily_start_equity = Some(30_000.0);
        snapshot.equity_peak = Some(30_150.0);
        snapshot
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"), 30_000.0);
        let snapshot = sample_snapshot(&store);

        store.persist(&snapshot).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("absent.json"), 30_000.0);
        let snapshot = store.load().await;
        assert_eq!(snapshot.balance, 30_000.0);
        assert_eq!(snapshot.equity, 30_000.0);
        assert!(snapshot.positions.is_empty());
        assert_eq!(snapshot.trading_day, chrono::Local::now().date_naive());
    }

    #[tokio::test]
    async fn corrupted_file_yields_default_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json at all").await.unwrap();

        let store = StateStore::new(path, 30_000.0);
        let snapshot = store.load().await;
        assert_eq!(snapshot.balance, 30_000.0);
        assert!(snapshot.positions.is_empty());
    }

    #[tokio::test]
    async fn persist_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::new(path.clone(), 30_000.0);

        store.persist(&store.default_snapshot()).await.unwrap();
        let snapshot = sample_snapshot(&store);
        store.persist(&snapshot).await.unwrap();

        assert_eq!(store.load().await, snapshot);
        assert!(!path.with_extension("tmp").exists());
    }
}
