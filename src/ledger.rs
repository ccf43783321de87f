// ===============================
// src/ledger.rs (position ledger: dedup + fold + persist)
// ===============================
//
// - enqueue()  : dari task mana pun, tidak pernah blok, tidak pernah drop.
// - update()   : satu-satunya konsumen; diserialisasi oleh `core` mutex.
// - position() : baca nilai terbulat dari `published`, tidak menunggu update.
//
// Store write tidak ditunggu oleh update: snapshot dikirim ke task persister
// (satu task, jadi urutan tulis terjaga). Persister menggabungkan snapshot
// yang antre dan menulis posisi penuh + id yang belum tersimpan. Kalau gagal,
// semuanya dicoba lagi pada snapshot berikutnya (setiap update mengirim satu).
//
// Id yang sudah ter-evict dari window akan diterima lagi bila venue
// mengirimnya ulang (lihat test `evicted_id_is_accepted_again`).
//
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::dedup::DedupWindow;
use crate::domain::Execution;
use crate::error::LedgerError;
use crate::metrics::{
    set_decimal, DEDUP_WINDOW_LEN, EXECS_APPLIED, EXECS_DUPLICATE, EXECS_MALFORMED, LEDGER_POSITION, STORE_WRITE_ERRORS,
};
use crate::reconcile;
use crate::store::{SnapshotWrite, StateStore};
use crate::venue::VenueClient;

/// Decimal places kept for the exposed and persisted position.
pub const POSITION_DP: u32 = 8;

pub fn round_position(v: Decimal) -> Decimal {
    v.round_dp(POSITION_DP)
}

/// Parse a persisted position. Accepts plain decimals and the scientific
/// notation a float-writing client may have left behind ("1e-05").
pub fn parse_position(key: &str, raw: &str) -> Result<Decimal, LedgerError> {
    let s = raw.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| LedgerError::StoreCorrupt { key: key.to_string(), value: raw.to_string() })
}

#[derive(Debug, Clone)]
pub struct LedgerKeys {
    pub position: String,
    pub execution_ids: String,
}

// ---------- persister ----------

enum PersistCmd {
    /// State after an update; `replace_ids` drops the stored id list first.
    Write { seq: u64, position: Decimal, new_ids: Vec<String>, replace_ids: bool },
    /// The store already holds `position` (just reseeded from it).
    Synced { seq: u64, position: Decimal },
}

struct Persister {
    store: Arc<dyn StateStore>,
    keys: LedgerKeys,
    keep: usize,
    written: Option<Decimal>,
    latest: Decimal,
    // applied but not yet in the store (bounded to window capacity)
    pending_ids: Vec<String>,
    replace_ids: bool,
}

impl Persister {
    fn absorb(&mut self, cmd: PersistCmd) -> u64 {
        match cmd {
            PersistCmd::Write { seq, position, new_ids, replace_ids } => {
                if replace_ids {
                    self.pending_ids.clear();
                    self.replace_ids = true;
                }
                self.pending_ids.extend(new_ids);
                if self.pending_ids.len() > self.keep {
                    let excess = self.pending_ids.len() - self.keep;
                    self.pending_ids.drain(..excess);
                }
                self.latest = position;
                seq
            }
            PersistCmd::Synced { seq, position } => {
                self.written = Some(position);
                self.latest = position;
                self.pending_ids.clear();
                self.replace_ids = false;
                seq
            }
        }
    }

    fn dirty(&self) -> bool {
        self.replace_ids || !self.pending_ids.is_empty() || self.written != Some(self.latest)
    }

    async fn write(&mut self) {
        if !self.dirty() {
            return;
        }
        let res = {
            let w = SnapshotWrite {
                position_key: &self.keys.position,
                position: self.latest.normalize().to_string(),
                ids_key: &self.keys.execution_ids,
                new_ids: &self.pending_ids,
                keep: self.keep,
                replace_ids: self.replace_ids,
            };
            self.store.write_snapshot(&w).await
        };
        match res {
            Ok(()) => {
                self.written = Some(self.latest);
                self.pending_ids.clear();
                self.replace_ids = false;
            }
            Err(e) => {
                STORE_WRITE_ERRORS.inc();
                warn!(error = %e, pending_ids = self.pending_ids.len(), "ledger persist failed, retry on next update");
            }
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PersistCmd>, done: watch::Sender<u64>) {
        while let Some(cmd) = rx.recv().await {
            let mut seq = self.absorb(cmd);
            // gabungkan semua snapshot yang sudah antre: cukup satu tulis
            while let Ok(cmd) = rx.try_recv() {
                seq = self.absorb(cmd);
            }
            self.write().await;
            let _ = done.send(seq);
        }
        debug!("ledger persister stopped");
    }
}

// ---------- ledger ----------

struct LedgerCore {
    inbound_rx: mpsc::UnboundedReceiver<Execution>,
    window: DedupWindow,
    position: Decimal,
    // nomor urut snapshot terakhir yang dikirim ke persister
    seq: u64,
}

pub struct PositionLedger {
    inbound_tx: mpsc::UnboundedSender<Execution>,
    core: Mutex<LedgerCore>,
    published: RwLock<Decimal>,
    store: Arc<dyn StateStore>,
    keys: LedgerKeys,
    persist_tx: mpsc::UnboundedSender<PersistCmd>,
    persisted_seq: watch::Receiver<u64>,
}

impl PositionLedger {
    /// Spawns the persister task, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn StateStore>, keys: LedgerKeys, capacity: NonZeroUsize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let (done_tx, persisted_seq) = watch::channel(0u64);
        let persister = Persister {
            store: store.clone(),
            keys: keys.clone(),
            keep: capacity.get(),
            written: None,
            latest: Decimal::ZERO,
            pending_ids: Vec::new(),
            replace_ids: false,
        };
        tokio::spawn(persister.run(persist_rx, done_tx));

        Self {
            inbound_tx,
            core: Mutex::new(LedgerCore {
                inbound_rx,
                window: DedupWindow::new(capacity),
                position: Decimal::ZERO,
                seq: 0,
            }),
            published: RwLock::new(Decimal::ZERO),
            store,
            keys,
            persist_tx,
            persisted_seq,
        }
    }

    pub fn enqueue(&self, exec: Execution) {
        // receiver hidup selama ledger hidup, jadi send tidak bisa gagal di sini
        if let Err(e) = self.inbound_tx.send(exec) {
            warn!(id = %e.0.id, "ledger inbound queue closed, execution not enqueued");
        }
    }

    /// Current position rounded to [`POSITION_DP`] places.
    pub fn position(&self) -> Decimal {
        *self.published.read()
    }

    fn publish(&self, core: &LedgerCore) {
        let rounded = round_position(core.position);
        *self.published.write() = rounded;
        set_decimal(&LEDGER_POSITION, rounded);
        DEDUP_WINDOW_LEN.set(core.window.len() as i64);
    }

    // Dipanggil dengan core terkunci supaya urutan seq = urutan state.
    fn submit(&self, core: &mut LedgerCore, new_ids: Vec<String>, replace_ids: bool) -> u64 {
        core.seq += 1;
        let cmd = PersistCmd::Write { seq: core.seq, position: round_position(core.position), new_ids, replace_ids };
        if self.persist_tx.send(cmd).is_err() {
            warn!("ledger persister stopped, snapshot not written");
        }
        core.seq
    }

    /// Drain the inbound queue once, fold unseen executions, then hand the
    /// resulting state to the persister. Returns without waiting for the store.
    pub async fn update(&self) -> Vec<Execution> {
        let mut core = self.core.lock().await;
        let mut applied = Vec::new();

        while let Ok(exec) = core.inbound_rx.try_recv() {
            if core.window.contains(&exec.id) {
                EXECS_DUPLICATE.inc();
                debug!(id = %exec.id, "duplicate execution discarded");
                continue;
            }
            // id masuk window hanya kalau fold berhasil
            let Some(next) = core.position.checked_add(exec.signed_amount()) else {
                EXECS_MALFORMED.inc();
                let e = LedgerError::MalformedExecution(format!("amount {} overflows position", exec.amount));
                warn!(id = %exec.id, error = %e, "execution skipped");
                continue;
            };
            core.window.insert(exec.id.clone());
            core.position = next;
            applied.push(exec);
        }

        if !applied.is_empty() {
            EXECS_APPLIED.inc_by(applied.len() as u64);
            self.publish(&core);
            debug!(applied = applied.len(), position = %self.position(), "ledger folded batch");
        }

        let new_ids = applied.iter().map(|e| e.id.clone()).collect();
        self.submit(&mut core, new_ids, false);
        applied
    }

    /// Wait until the persister has attempted a write covering everything
    /// folded so far. A failed attempt still counts; it stays pending.
    pub async fn flush(&self) {
        let seq = {
            let mut core = self.core.lock().await;
            self.submit(&mut core, Vec::new(), false)
        };
        let mut done = self.persisted_seq.clone();
        let _ = done.wait_for(|s| *s >= seq).await;
    }

    /// Startup path 1: resume from what the last process persisted.
    pub async fn reseed_from_store(&self) -> Result<(), LedgerError> {
        let raw = self.store.get(&self.keys.position).await?;
        let position = match raw {
            Some(v) => parse_position(&self.keys.position, &v)?,
            None => Decimal::ZERO,
        };

        let mut core = self.core.lock().await;
        let cap = core.window.capacity() as isize;
        let ids = self.store.list_range(&self.keys.execution_ids, -cap, -1).await?;

        core.window.load(ids);
        core.position = position;
        core.seq += 1;
        let _ = self.persist_tx.send(PersistCmd::Synced { seq: core.seq, position: round_position(position) });
        self.publish(&core);
        info!(position = %self.position(), window = core.window.len(), "ledger reseeded from store");
        Ok(())
    }

    /// Startup path 2: take the venue's open positions as truth and prime the
    /// window with its most recent `recent` executions. The stored id list is
    /// replaced, not appended to.
    pub async fn reseed_from_venue(&self, venue: &dyn VenueClient, instrument: &str, recent: usize) -> Result<(), LedgerError> {
        let position = reconcile::fetch(venue, instrument).await?;
        let trades = venue.fetch_recent_trades(instrument, recent).await?;

        let mut core = self.core.lock().await;
        core.window.load(trades.into_iter().map(|e| e.id));
        core.position = position;
        let ids = core.window.snapshot();
        self.submit(&mut core, ids, true);
        self.publish(&core);
        info!(position = %self.position(), window = core.window.len(), "ledger reseeded from venue");
        Ok(())
    }

    /// Window ids oldest-first (waits for any in-flight update).
    pub async fn window_snapshot(&self) -> Vec<String> {
        self.core.lock().await.window.snapshot()
    }

    pub fn keys(&self) -> &LedgerKeys {
        &self.keys
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::store::MemoryStore;
    use crate::venue::MockVenue;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Semaphore;
    use tokio::time::{timeout, Duration};

    fn keys() -> LedgerKeys {
        LedgerKeys { position: "position".into(), execution_ids: "recent_execution_ids".into() }
    }

    fn ledger_with(store: Arc<MemoryStore>, cap: usize) -> PositionLedger {
        PositionLedger::new(store, keys(), NonZeroUsize::new(cap).unwrap())
    }

    fn exec(id: &str, side: Side, amount: Decimal) -> Execution {
        Execution::new(id, side, amount).unwrap()
    }

    fn ids(execs: &[Execution]) -> Vec<&str> {
        execs.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn duplicate_in_one_batch_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone(), 500);
        ledger.enqueue(exec("1", Side::Buy, dec!(0.5)));
        ledger.enqueue(exec("2", Side::Sell, dec!(0.2)));
        ledger.enqueue(exec("1", Side::Buy, dec!(0.5)));

        let applied = ledger.update().await;
        assert_eq!(ids(&applied), ["1", "2"]);
        assert_eq!(ledger.position(), dec!(0.3));

        ledger.flush().await;

        assert_eq!(store.get("position").await.unwrap().as_deref(), Some("0.3"));
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn refeeding_applied_ids_leaves_position_unchanged() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()), 100);
        let batch = vec![
            exec("a", Side::Buy, dec!(1.25)),
            exec("b", Side::Sell, dec!(0.75)),
            exec("c", Side::Buy, dec!(0.001)),
        ];
        for e in &batch {
            ledger.enqueue(e.clone());
        }
        ledger.update().await;
        let before = ledger.position();

        for e in batch.iter().rev() {
            ledger.enqueue(e.clone());
        }
        assert!(ledger.update().await.is_empty());
        assert_eq!(ledger.position(), before);
    }

    #[tokio::test]
    async fn batch_boundaries_do_not_change_result() {
        let execs: Vec<Execution> = (0..40)
            .map(|i| {
                let side = if i % 3 == 0 { Side::Sell } else { Side::Buy };
                exec(&format!("t{i}"), side, Decimal::new(i + 1, 3))
            })
            .collect();
        let expected: Decimal = execs.iter().map(Execution::signed_amount).sum();

        let one = ledger_with(Arc::new(MemoryStore::new()), 500);
        for e in &execs {
            one.enqueue(e.clone());
        }
        one.update().await;

        let many = ledger_with(Arc::new(MemoryStore::new()), 500);
        for chunk in execs.chunks(7) {
            for e in chunk {
                many.enqueue(e.clone());
            }
            // overlap: ulang id pertama dari chunk
            many.enqueue(chunk[0].clone());
            many.update().await;
        }

        assert_eq!(one.position(), round_position(expected));
        assert_eq!(many.position(), one.position());
    }

    #[tokio::test]
    async fn evicted_id_is_accepted_again() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()), 3);
        for id in ["A", "B", "C", "D"] {
            ledger.enqueue(exec(id, Side::Buy, dec!(1)));
        }
        ledger.update().await;
        assert_eq!(ledger.window_snapshot().await, vec!["B", "C", "D"]);
        assert_eq!(ledger.position(), dec!(4));

        // A sudah keluar dari window, jadi dihitung lagi
        ledger.enqueue(exec("A", Side::Buy, dec!(1)));
        let applied = ledger.update().await;
        assert_eq!(ids(&applied), ["A"]);
        assert_eq!(ledger.position(), dec!(5));
        assert_eq!(ledger.window_snapshot().await, vec!["C", "D", "A"]);
    }

    #[tokio::test]
    async fn store_list_is_trimmed_to_capacity() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone(), 3);
        for i in 0..5 {
            ledger.enqueue(exec(&i.to_string(), Side::Buy, dec!(1)));
            ledger.update().await;
        }
        ledger.flush().await;
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn reseed_from_store_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let first = ledger_with(store.clone(), 10);
        first.enqueue(exec("x", Side::Buy, dec!(0.123456789)));
        first.enqueue(exec("y", Side::Sell, dec!(0.02)));
        first.update().await;
        first.flush().await;
        let persisted = first.position();
        assert_eq!(persisted, dec!(0.10345679));

        let restarted = ledger_with(store.clone(), 10);
        restarted.reseed_from_store().await.unwrap();
        assert_eq!(restarted.position(), persisted);
        assert_eq!(restarted.window_snapshot().await, vec!["x", "y"]);

        // id lama tetap dikenali setelah restart
        restarted.enqueue(exec("x", Side::Buy, dec!(0.123456789)));
        assert!(restarted.update().await.is_empty());
    }

    #[tokio::test]
    async fn reseed_from_empty_store_starts_at_zero() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()), 10);
        ledger.reseed_from_store().await.unwrap();
        assert_eq!(ledger.position(), Decimal::ZERO);
        assert!(ledger.window_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn reseed_from_store_loads_only_most_recent_capacity() {
        let store = Arc::new(MemoryStore::new());
        let all: Vec<String> = (1..=6).map(|i| i.to_string()).collect();
        store.list_push_many("recent_execution_ids", &all).await.unwrap();
        store.set("position", "1e-05").await.unwrap();

        let ledger = ledger_with(store, 4);
        ledger.reseed_from_store().await.unwrap();
        assert_eq!(ledger.position(), dec!(0.00001));
        assert_eq!(ledger.window_snapshot().await, vec!["3", "4", "5", "6"]);
    }

    #[tokio::test]
    async fn corrupt_persisted_position_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set("position", "not-a-number").await.unwrap();
        let ledger = ledger_with(store, 4);
        assert!(matches!(ledger.reseed_from_store().await, Err(LedgerError::StoreCorrupt { .. })));
    }

    #[tokio::test]
    async fn failed_write_keeps_memory_and_retries_full_state() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone(), 10);

        store.set_fail_writes(true);
        ledger.enqueue(exec("1", Side::Buy, dec!(2)));
        let applied = ledger.update().await;
        ledger.flush().await;
        assert_eq!(applied.len(), 1);
        assert_eq!(ledger.position(), dec!(2));
        store.set_fail_writes(false);
        assert_eq!(store.get("position").await.unwrap(), None);

        // tidak ada execution baru, tapi state kotor tetap ditulis ulang
        assert!(ledger.update().await.is_empty());
        ledger.flush().await;
        assert_eq!(store.get("position").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["1"]);

        ledger.enqueue(exec("2", Side::Sell, dec!(0.5)));
        ledger.update().await;
        ledger.flush().await;
        assert_eq!(store.get("position").await.unwrap().as_deref(), Some("1.5"));
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn reseed_from_venue_uses_authoritative_position() {
        let venue = MockVenue::new();
        venue.record(exec("v1", Side::Buy, dec!(3)));
        venue.record(exec("v2", Side::Sell, dec!(1)));
        venue.record(exec("v3", Side::Buy, dec!(0.5)));

        let store = Arc::new(MemoryStore::new());
        // sisa proses sebelumnya; v2 ada di sana juga
        store.list_push_many("recent_execution_ids", &["old".to_string(), "v2".to_string()]).await.unwrap();

        let ledger = ledger_with(store.clone(), 10);
        ledger.reseed_from_venue(&venue, "BTCUSDT", 2).await.unwrap();
        assert_eq!(ledger.position(), dec!(2.5));
        assert_eq!(ledger.window_snapshot().await, vec!["v2", "v3"]);

        // v3 dikenal, v1 tidak (di luar N terakhir)
        ledger.enqueue(exec("v3", Side::Buy, dec!(0.5)));
        ledger.enqueue(exec("v4", Side::Sell, dec!(0.5)));
        let applied = ledger.update().await;
        assert_eq!(ids(&applied), ["v4"]);
        assert_eq!(ledger.position(), dec!(2));

        ledger.flush().await;
        assert_eq!(store.get("position").await.unwrap().as_deref(), Some("2"));
        // list diganti, tidak ada duplikat v2
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["v2", "v3", "v4"]);
    }

    #[tokio::test]
    async fn reseed_from_store_does_not_rewrite_unchanged_state() {
        let store = Arc::new(MemoryStore::new());
        store.set("position", "1e-05").await.unwrap();
        let ledger = ledger_with(store.clone(), 4);
        ledger.reseed_from_store().await.unwrap();

        ledger.update().await;
        ledger.flush().await;
        assert_eq!(store.get("position").await.unwrap().as_deref(), Some("1e-05"));
    }

    #[tokio::test]
    async fn overflowing_execution_is_skipped_and_not_remembered() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_with(store.clone(), 10);
        ledger.enqueue(exec("a", Side::Buy, Decimal::MAX));
        ledger.enqueue(exec("b", Side::Buy, Decimal::MAX));
        ledger.enqueue(exec("c", Side::Sell, dec!(1)));

        let applied = ledger.update().await;
        assert_eq!(ids(&applied), ["a", "c"]);
        assert_eq!(ledger.position(), Decimal::MAX - dec!(1));
        assert_eq!(ledger.window_snapshot().await, vec!["a", "c"]);

        ledger.flush().await;
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["a", "c"]);

        // setelah posisi turun, b bisa di-fold
        ledger.enqueue(exec("d", Side::Sell, Decimal::MAX));
        ledger.enqueue(exec("b", Side::Buy, dec!(1)));
        let applied = ledger.update().await;
        assert_eq!(ids(&applied), ["d", "b"]);
        assert_eq!(ledger.position(), Decimal::ZERO);
    }

    /// Store whose snapshot writes wait for a permit.
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
    }

    #[async_trait]
    impl StateStore for GatedStore {
        async fn get(&self, k: &str) -> Result<Option<String>, LedgerError> {
            self.inner.get(k).await
        }
        async fn set(&self, k: &str, v: &str) -> Result<(), LedgerError> {
            self.inner.set(k, v).await
        }
        async fn list_range(&self, k: &str, s: isize, e: isize) -> Result<Vec<String>, LedgerError> {
            self.inner.list_range(k, s, e).await
        }
        async fn list_push_many(&self, k: &str, v: &[String]) -> Result<(), LedgerError> {
            self.inner.list_push_many(k, v).await
        }
        async fn list_trim(&self, k: &str, s: isize, e: isize) -> Result<(), LedgerError> {
            self.inner.list_trim(k, s, e).await
        }
        async fn delete(&self, k: &str) -> Result<(), LedgerError> {
            self.inner.delete(k).await
        }
        async fn write_snapshot(&self, w: &SnapshotWrite<'_>) -> Result<(), LedgerError> {
            let permit = self.gate.acquire().await.map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?;
            permit.forget();
            self.inner.write_snapshot(w).await
        }
    }

    #[tokio::test]
    async fn update_returns_while_store_write_is_stuck() {
        let store = Arc::new(GatedStore { inner: MemoryStore::new(), gate: Semaphore::new(0) });
        let ledger = PositionLedger::new(store.clone(), keys(), NonZeroUsize::new(10).unwrap());

        ledger.enqueue(exec("1", Side::Buy, dec!(1)));
        let applied = timeout(Duration::from_secs(1), ledger.update()).await.expect("update waited on the store");
        assert_eq!(ids(&applied), ["1"]);

        // write pertama masih tertahan; update berikutnya tetap jalan
        ledger.enqueue(exec("2", Side::Buy, dec!(2)));
        let applied = timeout(Duration::from_secs(1), ledger.update()).await.expect("update waited on the store");
        assert_eq!(ids(&applied), ["2"]);
        assert_eq!(ledger.position(), dec!(3));
        assert_eq!(store.get("position").await.unwrap(), None);

        store.gate.add_permits(10);
        ledger.flush().await;
        assert_eq!(store.get("position").await.unwrap().as_deref(), Some("3"));
        assert_eq!(store.list_range("recent_execution_ids", 0, -1).await.unwrap(), vec!["1", "2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueue_is_drained_exactly_once() {
        let ledger = Arc::new(ledger_with(Arc::new(MemoryStore::new()), 10_000));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    for i in 0..500 {
                        ledger.enqueue(exec(&format!("p{p}-{i}"), Side::Buy, dec!(0.01)));
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();

        let consumer = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.extend(ledger.update().await.into_iter().map(|e| e.id));
                    tokio::task::yield_now().await;
                }
                seen
            })
        };

        for p in producers {
            p.await.unwrap();
        }
        let mut seen = consumer.await.unwrap();
        seen.extend(ledger.update().await.into_iter().map(|e| e.id));

        assert_eq!(seen.len(), 2_000);
        let distinct: std::collections::HashSet<_> = seen.iter().collect();
        assert_eq!(distinct.len(), 2_000);
        assert_eq!(ledger.position(), dec!(20));
    }
}
