// ===============================
// src/binance.rs
// ===============================
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::{Execution, OpenPosition, Side};
use crate::error::LedgerError;

pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(query.as_bytes());
    let sig = mac.finalize().into_bytes();
    hex::encode(sig)
}

/// `k=v&k=v` dengan value di-url-encode (urutan dipertahankan, ikut signature)
pub fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ---- GET /fapi/v1/userTrades ----
// Semua field optional: record yang tidak lengkap dibuang sebagai MalformedExecution,
// bukan menggagalkan seluruh halaman.
#[derive(Debug, Deserialize)]
pub struct RawTrade {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub time: Option<u64>,
}

impl TryFrom<RawTrade> for Execution {
    type Error = LedgerError;

    fn try_from(t: RawTrade) -> Result<Self, Self::Error> {
        let id = t.id.ok_or_else(|| LedgerError::MalformedExecution("trade without id".into()))?;
        let side = t
            .side
            .as_deref()
            .and_then(Side::parse)
            .ok_or_else(|| LedgerError::MalformedExecution(format!("trade {id}: bad side {:?}", t.side)))?;
        let amount = t
            .qty
            .as_deref()
            .and_then(|q| Decimal::from_str(q).ok())
            .ok_or_else(|| LedgerError::MalformedExecution(format!("trade {id}: bad qty {:?}", t.qty)))?;
        Execution::new(id.to_string(), side, amount)
    }
}

// ---- GET /fapi/v2/positionRisk ----
#[derive(Debug, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub position_amt: String, // signed; negatif = short (one-way maupun hedge mode)
    #[serde(rename = "positionSide", default)]
    pub position_side: Option<String>, // BOTH | LONG | SHORT
}

impl PositionRisk {
    /// `None` when flat.
    pub fn to_open_position(&self) -> Result<Option<OpenPosition>, LedgerError> {
        let amt = Decimal::from_str(self.position_amt.trim()).map_err(|e| {
            LedgerError::VenueUnavailable(format!("positionAmt {:?} for {}: {e}", self.position_amt, self.symbol))
        })?;
        if amt.is_zero() {
            return Ok(None);
        }
        let side = if amt.is_sign_positive() { Side::Buy } else { Side::Sell };
        Ok(Some(OpenPosition { side, size: amt.abs() }))
    }
}
