// ===============================
// src/reconcile.rs (authoritative fetch + drift report)
// ===============================
//
// Hanya membaca: posisi ledger tidak pernah ditimpa dari sini.
//
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{OpenPosition, ReconcileReport};
use crate::error::LedgerError;
use crate::ledger::{parse_position, round_position, PositionLedger};
use crate::metrics::{set_decimal, AUTHORITATIVE_POSITION, PERSISTED_POSITION, POSITION_DRIFT};
use crate::store::StateStore;
use crate::venue::VenueClient;

/// Σ BUY sizes − Σ SELL sizes.
pub fn authoritative_total(open: &[OpenPosition]) -> Decimal {
    open.iter().map(|p| p.side.sign() * p.size).sum()
}

pub async fn fetch(venue: &dyn VenueClient, instrument: &str) -> Result<Decimal, LedgerError> {
    let open = venue.fetch_open_positions(instrument).await?;
    Ok(round_position(authoritative_total(&open)))
}

pub struct Reconciler {
    pub instrument: String,
    pub drift_tolerance: Decimal,
}

impl Reconciler {
    /// One report tick: persisted value, ledger value, venue value side by side.
    /// A store read failure degrades to `persisted: None`; a venue failure
    /// fails the tick.
    pub async fn report(
        &self,
        ledger: &PositionLedger,
        store: &dyn StateStore,
        venue: &dyn VenueClient,
    ) -> Result<ReconcileReport, LedgerError> {
        let authoritative = fetch(venue, &self.instrument).await?;
        let ledger_pos = ledger.position();

        let key = &ledger.keys().position;
        let persisted = match store.get(key).await {
            Ok(Some(raw)) => match parse_position(key, &raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "persisted position unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "persisted position not available");
                None
            }
        };

        let drift = ledger_pos - authoritative;
        let report = ReconcileReport {
            ts_ms: Utc::now().timestamp_millis(),
            instrument: self.instrument.clone(),
            persisted,
            ledger: ledger_pos,
            authoritative,
            drift,
        };

        if let Some(p) = persisted {
            set_decimal(&PERSISTED_POSITION, p);
        }
        set_decimal(&AUTHORITATIVE_POSITION, authoritative);
        set_decimal(&POSITION_DRIFT, drift);

        let persisted_str = persisted.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        info!(
            instrument = %self.instrument,
            persisted = %persisted_str,
            ledger = %ledger_pos,
            authoritative = %authoritative,
            drift = %drift,
            "position report"
        );
        if drift.abs() > self.drift_tolerance {
            warn!(instrument = %self.instrument, drift = %drift, tolerance = %self.drift_tolerance, "ledger drifted from venue");
        }

        Ok(report)
    }
}
