// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Execution flow --------
pub static EXECS_INGESTED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("executions_ingested_total", "executions pulled from venue and enqueued").unwrap());

pub static EXECS_APPLIED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("executions_applied_total", "executions folded into the position").unwrap());

pub static EXECS_DUPLICATE: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("executions_duplicate_total", "executions discarded by the dedup window").unwrap());

pub static EXECS_MALFORMED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("executions_malformed_total", "venue records dropped as malformed").unwrap());

pub static STORE_WRITE_ERRORS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("store_write_errors_total", "failed ledger snapshot writes").unwrap());

pub static RECORDER_DROPPED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("recorder_events_dropped_total", "audit events dropped because the recorder queue was full").unwrap());

pub static TASK_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("task_runs_total", "periodic task runs (labels: task, outcome)"),
        &["task", "outcome"],
    )
    .unwrap()
});

// -------- Position --------
pub static LEDGER_POSITION: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("ledger_position", "in-memory ledger position").unwrap());

pub static PERSISTED_POSITION: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("persisted_position", "position last read back from the store").unwrap());

pub static AUTHORITATIVE_POSITION: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("authoritative_position", "position summed from venue open positions").unwrap());

pub static POSITION_DRIFT: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("position_drift", "ledger minus authoritative position").unwrap());

pub static DEDUP_WINDOW_LEN: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("dedup_window_len", "ids currently held by the dedup window").unwrap());

// ---- Config visibility (venue / store / instrument) ----
pub static CONFIG_VENUE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_venue_mode", "venue mode (label: mode)"), &["mode"]).unwrap()
});

pub static CONFIG_STORE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_store_mode", "store mode (label: mode)"), &["mode"]).unwrap()
});

pub static CONFIG_INSTRUMENT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_instrument", "instrument tracked (label: instrument), value = dedup capacity"),
        &["instrument"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(EXECS_INGESTED.clone())),
        REGISTRY.register(Box::new(EXECS_APPLIED.clone())),
        REGISTRY.register(Box::new(EXECS_DUPLICATE.clone())),
        REGISTRY.register(Box::new(EXECS_MALFORMED.clone())),
        REGISTRY.register(Box::new(STORE_WRITE_ERRORS.clone())),
        REGISTRY.register(Box::new(RECORDER_DROPPED.clone())),
        REGISTRY.register(Box::new(TASK_RUNS.clone())),
        REGISTRY.register(Box::new(LEDGER_POSITION.clone())),
        REGISTRY.register(Box::new(PERSISTED_POSITION.clone())),
        REGISTRY.register(Box::new(AUTHORITATIVE_POSITION.clone())),
        REGISTRY.register(Box::new(POSITION_DRIFT.clone())),
        REGISTRY.register(Box::new(DEDUP_WINDOW_LEN.clone())),
        // Config visibility
        REGISTRY.register(Box::new(CONFIG_VENUE_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_STORE_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_INSTRUMENT.clone())),
    ] {
        let _ = m;
    }
}

/// Gauges are f64; precision loss only affects the dashboard, never the ledger.
pub fn set_decimal(g: &Gauge, v: Decimal) {
    g.set(v.to_f64().unwrap_or(f64::NAN));
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(%addr, error = %e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        tracing::info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(error = %e, "metrics accept error"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn encoded_output_contains_registered_families() {
        init();
        EXECS_APPLIED.inc();
        set_decimal(&LEDGER_POSITION, dec!(0.3));
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("executions_applied_total"));
        assert!(text.contains("# TYPE ledger_position gauge"));
    }
}
