// ===============================
// src/error.rs
// ===============================
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store value under `{key}` is unreadable: {value:?}")]
    StoreCorrupt { key: String, value: String },
    #[error("venue unavailable: {0}")]
    VenueUnavailable(String),
    #[error("malformed execution: {0}")]
    MalformedExecution(String),
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

impl From<redis::RedisError> for LedgerError {
    fn from(e: redis::RedisError) -> Self {
        LedgerError::StoreUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::VenueUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::VenueUnavailable(format!("decode: {e}"))
    }
}

impl LedgerError {
    /// Short label for metrics (`task_runs_total{outcome=...}` dll).
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::StoreUnavailable(_) => "store_unavailable",
            LedgerError::StoreCorrupt { .. } => "store_corrupt",
            LedgerError::VenueUnavailable(_) => "venue_unavailable",
            LedgerError::MalformedExecution(_) => "malformed_execution",
            LedgerError::Timeout { .. } => "timeout",
        }
    }
}
