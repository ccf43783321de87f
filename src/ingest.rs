// ===============================
// src/ingest.rs (venue -> ledger inbound queue)
// ===============================
//
// Halaman yang overlap antar tick itu normal; dedup urusan ledger, bukan di sini.
//
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::PositionLedger;
use crate::metrics::EXECS_INGESTED;
use crate::venue::VenueClient;

/// Pull one page of recent executions and enqueue all of them.
/// Returns how many were enqueued.
pub async fn pull_once(
    venue: &dyn VenueClient,
    ledger: &PositionLedger,
    instrument: &str,
    page_size: usize,
) -> Result<usize, LedgerError> {
    let page = venue.fetch_recent_trades(instrument, page_size).await?;
    let n = page.len();
    for exec in page {
        ledger.enqueue(exec);
    }
    EXECS_INGESTED.inc_by(n as u64);
    debug!(instrument, enqueued = n, "ingest tick");
    Ok(n)
}
