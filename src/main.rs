// ===============================
// src/main.rs
// ===============================
/*
 # cek posisi & drift
 curl -s localhost:9898/metrics | egrep '^(ledger_position|persisted_position|authoritative_position|position_drift)'

 # kesehatan task periodik
 curl -s localhost:9898/metrics | grep '^task_runs_total'
*/
/*
=============================================================================
Project : position_ledger : async position ledger for venue executions
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Polls executions from a venue (mock/Binance futures), deduplicates
          them with a bounded id window, folds them into a net position,
          persists state to a shared store (memory/redis), and reconciles
          against the venue's open positions.
=============================================================================
*/
mod binance;          // helper (signer/models) for Binance futures
mod config;
mod dedup;
mod domain;
mod error;
mod ingest;
mod ledger;
mod metrics;
mod reconcile;
mod recorder;
mod scheduler;
mod store;
mod store_redis;
mod venue;            // trait + mock venue
mod venue_binance;    // real Binance USDⓈ-M futures (REST)

use std::sync::Arc;
use tokio::{select, sync::mpsc, time::interval};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ReseedSource, StoreMode, VenueMode};
use crate::domain::Event;
use crate::error::LedgerError;
use crate::ledger::{LedgerKeys, PositionLedger};
use crate::reconcile::Reconciler;
use crate::store::{MemoryStore, StateStore};
use crate::venue::{MockVenue, VenueClient};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let cfg = match config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    metrics::serve_metrics(cfg.metrics_port);

    info!(
        instrument = %cfg.instrument,
        venue_mode = cfg.venue_mode.as_str(),
        store_mode = cfg.store_mode.as_str(),
        dedup_capacity = cfg.dedup_capacity.get(),
        page_size = cfg.page_size,
        reseed = ?cfg.reseed,
        intervals = ?cfg.intervals,
        "startup config"
    );
    metrics::CONFIG_VENUE_MODE.with_label_values(&[cfg.venue_mode.as_str()]).set(1);
    metrics::CONFIG_STORE_MODE.with_label_values(&[cfg.store_mode.as_str()]).set(1);
    metrics::CONFIG_INSTRUMENT
        .with_label_values(&[&cfg.instrument])
        .set(cfg.dedup_capacity.get() as i64);

    // ---- Store ----
    let store: Arc<dyn StateStore> = match cfg.store_mode {
        StoreMode::Memory => {
            warn!("memory store: state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
        StoreMode::Redis => match store_redis::RedisStore::connect(&cfg.redis_url, cfg.request_timeout).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!(error = %e, url = %cfg.redis_url, "cannot reach store");
                std::process::exit(1);
            }
        },
    };

    // ---- Venue ----
    let venue: Arc<dyn VenueClient> = match (&cfg.venue_mode, &cfg.credentials) {
        (VenueMode::Mock, _) => Arc::new(MockVenue::with_random_flow()),
        (VenueMode::BinanceTestnet | VenueMode::BinanceMainnet, Some(creds)) => {
            match venue_binance::BinanceVenue::new(cfg.rest_url.clone(), creds.clone(), cfg.recv_window, cfg.request_timeout) {
                Ok(v) => Arc::new(v),
                Err(e) => {
                    error!(error = %e, "cannot build venue client");
                    std::process::exit(1);
                }
            }
        }
        (_, None) => {
            // config::load sudah memvalidasi, tapi jangan panic
            error!("venue credentials missing");
            std::process::exit(2);
        }
    };

    // ---- Ledger + reseed (tepat satu jalur per proses) ----
    let ledger = Arc::new(PositionLedger::new(
        store.clone(),
        LedgerKeys { position: cfg.position_key.clone(), execution_ids: cfg.execution_ids_key.clone() },
        cfg.dedup_capacity,
    ));
    let reseeded = match cfg.reseed {
        ReseedSource::Store => ledger.reseed_from_store().await,
        ReseedSource::Venue => ledger.reseed_from_venue(venue.as_ref(), &cfg.instrument, cfg.reseed_trades).await,
    };
    if let Err(e) = reseeded {
        error!(error = %e, source = ?cfg.reseed, "reseed failed");
        std::process::exit(1);
    }

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let recorder_task = cfg.record_file.clone().map(|path| tokio::spawn(recorder::run(rec_rx, path)));

    // ---- Periodic tasks ----
    let ingest_task = scheduler::spawn_periodic("ingest", cfg.intervals.ingest, {
        let venue = venue.clone();
        let ledger = ledger.clone();
        let instrument = cfg.instrument.clone();
        let page_size = cfg.page_size;
        move || {
            let venue = venue.clone();
            let ledger = ledger.clone();
            let instrument = instrument.clone();
            async move {
                ingest::pull_once(venue.as_ref(), &ledger, &instrument, page_size).await?;
                Ok::<(), LedgerError>(())
            }
        }
    });

    let update_task = scheduler::spawn_periodic("ledger_update", cfg.intervals.update, {
        let ledger = ledger.clone();
        let rec_tx = rec_tx.clone();
        move || {
            let ledger = ledger.clone();
            let rec_tx = rec_tx.clone();
            async move {
                for exec in ledger.update().await {
                    recorder::offer(&rec_tx, Event::Applied(exec));
                }
                Ok::<(), LedgerError>(())
            }
        }
    });

    let reconcile_task = scheduler::spawn_periodic("reconcile", cfg.intervals.reconcile, {
        let venue = venue.clone();
        let ledger = ledger.clone();
        let store = store.clone();
        let rec_tx = rec_tx.clone();
        let reconciler = Arc::new(Reconciler {
            instrument: cfg.instrument.clone(),
            drift_tolerance: cfg.drift_tolerance,
        });
        move || {
            let venue = venue.clone();
            let ledger = ledger.clone();
            let store = store.clone();
            let rec_tx = rec_tx.clone();
            let reconciler = reconciler.clone();
            async move {
                let report = reconciler.report(&ledger, store.as_ref(), venue.as_ref()).await?;
                recorder::offer(&rec_tx, Event::Reconcile(report));
                Ok::<(), LedgerError>(())
            }
        }
    });

    // ---- Heartbeat + shutdown ----
    recorder::offer(&rec_tx, Event::Note(format!("started instrument={}", cfg.instrument)));
    let mut status = interval(cfg.intervals.status);
    loop {
        select! {
            _ = status.tick() => {
                info!(
                    instrument = %cfg.instrument,
                    position = %ledger.position(),
                    window = metrics::DEDUP_WINDOW_LEN.get(),
                    "heartbeat"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    ingest_task.abort();
    update_task.abort();
    reconcile_task.abort();
    let _ = futures_util::future::join_all([ingest_task, update_task, reconcile_task]).await;

    // flush terakhir: fold sisa queue dan tunggu persister sebelum keluar
    for exec in ledger.update().await {
        recorder::offer(&rec_tx, Event::Applied(exec));
    }
    ledger.flush().await;
    info!(position = %ledger.position(), "final position");

    drop(rec_tx);
    if let Some(handle) = recorder_task {
        let _ = handle.await;
    }
}
