//! Core module - Common types, errors, and configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use types::*;
