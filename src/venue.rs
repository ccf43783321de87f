// ===============================
// src/venue.rs (venue client trait + mock venue)
// ===============================
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{Execution, OpenPosition, Side};
use crate::error::LedgerError;

#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Most recent executions, oldest first, at most `limit`.
    async fn fetch_recent_trades(&self, instrument: &str, limit: usize) -> Result<Vec<Execution>, LedgerError>;

    async fn fetch_open_positions(&self, instrument: &str) -> Result<Vec<OpenPosition>, LedgerError>;
}

#[derive(Debug, Default)]
struct MockBook {
    next_id: u64,
    history: Vec<Execution>,
    net: Decimal,
}

/// Mock venue. Every fetch can append a few random fills, and a fetch always
/// returns the tail of the full history, so consecutive pages overlap the
/// same way a polled REST endpoint does.
#[derive(Debug, Default)]
pub struct MockVenue {
    book: Mutex<MockBook>,
    auto_fills: bool,
    offline: AtomicBool,
}

impl MockVenue {
    /// Scripted venue: only fills passed to [`MockVenue::record`] exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Random fill flow (0..=3 fill baru per fetch), untuk VENUE_MODE=mock.
    pub fn with_random_flow() -> Self {
        Self { auto_fills: true, ..Self::default() }
    }

    pub fn record(&self, exec: Execution) {
        let mut book = self.book.lock();
        book.net += exec.signed_amount();
        book.history.push(exec);
    }

    pub fn set_offline(&self, on: bool) {
        self.offline.store(on, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::VenueUnavailable("mock venue offline".into()));
        }
        Ok(())
    }

    fn random_fills(&self) {
        // jangan simpan ThreadRng melewati .await
        let mut rng = rand::thread_rng();
        let n = rng.gen_range(0..=3);
        let mut book = self.book.lock();
        for _ in 0..n {
            book.next_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            // 0.001 .. 0.100, 3 desimal
            let amount = Decimal::new(rng.gen_range(1..=100), 3);
            let exec = Execution { id: format!("mock-{}", book.next_id), side, amount };
            book.net += exec.signed_amount();
            book.history.push(exec);
        }
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    async fn fetch_recent_trades(&self, _instrument: &str, limit: usize) -> Result<Vec<Execution>, LedgerError> {
        self.check_online()?;
        if self.auto_fills {
            self.random_fills();
        }
        let book = self.book.lock();
        let from = book.history.len().saturating_sub(limit);
        Ok(book.history[from..].to_vec())
    }

    async fn fetch_open_positions(&self, _instrument: &str) -> Result<Vec<OpenPosition>, LedgerError> {
        self.check_online()?;
        let net = self.book.lock().net;
        if net.is_zero() {
            return Ok(Vec::new());
        }
        let side = if net.is_sign_positive() { Side::Buy } else { Side::Sell };
        Ok(vec![OpenPosition { side, size: net.abs() }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exec(id: &str, side: Side, amount: Decimal) -> Execution {
        Execution::new(id, side, amount).unwrap()
    }

    #[tokio::test]
    async fn recent_trades_returns_tail_oldest_first() {
        let venue = MockVenue::new();
        for i in 1..=5 {
            venue.record(exec(&i.to_string(), Side::Buy, dec!(1)));
        }
        let page = venue.fetch_recent_trades("BTCUSDT", 3).await.unwrap();
        let ids: Vec<_> = page.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["3", "4", "5"]);
    }

    #[tokio::test]
    async fn open_positions_report_net_side_and_size() {
        let venue = MockVenue::new();
        assert!(venue.fetch_open_positions("X").await.unwrap().is_empty());
        venue.record(exec("1", Side::Buy, dec!(0.5)));
        venue.record(exec("2", Side::Sell, dec!(0.8)));
        let open = venue.fetch_open_positions("X").await.unwrap();
        assert_eq!(open, vec![OpenPosition { side: Side::Sell, size: dec!(0.3) }]);
    }

    #[tokio::test]
    async fn random_flow_pages_overlap() {
        let venue = MockVenue::with_random_flow();
        let mut seen = 0usize;
        for _ in 0..20 {
            let page = venue.fetch_recent_trades("X", 100).await.unwrap();
            assert!(page.len() >= seen, "history only grows");
            seen = page.len();
        }
    }

    #[tokio::test]
    async fn offline_venue_fails() {
        let venue = MockVenue::new();
        venue.set_offline(true);
        assert!(matches!(
            venue.fetch_recent_trades("X", 10).await,
            Err(LedgerError::VenueUnavailable(_))
        ));
        assert!(venue.fetch_open_positions("X").await.is_err());
    }
}
