// ===============================
// src/domain.rs
// ===============================
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side {
    pub fn sign(&self) -> Decimal { match self { Side::Buy => Decimal::ONE, Side::Sell => Decimal::NEGATIVE_ONE } }

    /// Venue spelling ("BUY"/"SELL", case-insensitive; "B"/"S" juga diterima)
    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" | "LONG" => Some(Side::Buy),
            "SELL" | "S" | "SHORT" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Satu fill dari venue. Immutable setelah dibuat; hanya `id` yang disimpan ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl Execution {
    pub fn new(id: impl Into<String>, side: Side, amount: Decimal) -> Result<Self, LedgerError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(LedgerError::MalformedExecution("empty execution id".into()));
        }
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(LedgerError::MalformedExecution(format!("negative amount {amount} on {id}")));
        }
        Ok(Self { id, side, amount })
    }

    /// +amount untuk BUY, -amount untuk SELL
    pub fn signed_amount(&self) -> Decimal { self.side.sign() * self.amount }
}

/// One open position entry as reported by the venue (size always >= 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition { pub side: Side, pub size: Decimal }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub ts_ms: i64,
    pub instrument: String,
    pub persisted: Option<Decimal>,
    pub ledger: Decimal,
    pub authoritative: Decimal,
    pub drift: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Applied(Execution), Reconcile(ReconcileReport), Note(String) }
