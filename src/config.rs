// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : position_ledger : async position ledger for venue executions
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Polls executions from a venue (mock/Binance futures), deduplicates
          them with a bounded id window, folds them into a net position,
          persists state to a shared store (memory/redis), and reconciles
          against the venue's open positions.
=============================================================================
*/
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;

/// Sumber execution / open positions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VenueMode {
    Mock,
    BinanceTestnet,
    BinanceMainnet,
}

impl VenueMode {
    pub fn parse(s: &str) -> Option<VenueMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(VenueMode::Mock),
            "binance_testnet" | "binance_sandbox" => Some(VenueMode::BinanceTestnet),
            "binance_mainnet" => Some(VenueMode::BinanceMainnet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VenueMode::Mock => "mock",
            VenueMode::BinanceTestnet => "binance_testnet",
            VenueMode::BinanceMainnet => "binance_mainnet",
        }
    }

    // Endpoint default per mode
    pub fn default_rest_url(&self) -> &'static str {
        match self {
            VenueMode::Mock => "https://testnet.binancefuture.com", // tidak dipakai saat mock
            VenueMode::BinanceTestnet => "https://testnet.binancefuture.com",
            VenueMode::BinanceMainnet => "https://fapi.binance.com",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Redis,
}

impl StoreMode {
    pub fn parse(s: &str) -> Option<StoreMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(StoreMode::Memory),
            "redis" => Some(StoreMode::Redis),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Memory => "memory",
            StoreMode::Redis => "redis",
        }
    }
}

/// Exactly one reseed path per process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReseedSource {
    Store,
    Venue,
}

impl ReseedSource {
    pub fn parse(s: &str) -> Option<ReseedSource> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Some(ReseedSource::Store),
            "venue" => Some(ReseedSource::Venue),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct VenueCredentials {
    pub api_key: String,
    pub api_secret: String,
}

// Jangan pernah log secret
impl std::fmt::Debug for VenueCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueCredentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Intervals {
    pub ingest: Duration,
    pub update: Duration,
    pub reconcile: Duration,
    pub status: Duration,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub instrument: String,

    // venue
    pub venue_mode: VenueMode,
    pub rest_url: String,
    pub credentials: Option<VenueCredentials>,
    pub recv_window: u64,

    // store
    pub store_mode: StoreMode,
    pub redis_url: String,
    pub position_key: String,
    pub execution_ids_key: String,

    // ledger
    pub dedup_capacity: NonZeroUsize,
    pub page_size: usize,
    pub reseed: ReseedSource,
    pub reseed_trades: usize,
    pub drift_tolerance: Decimal,

    // scheduling
    pub intervals: Intervals,
    pub request_timeout: Duration,

    // files/metrics
    pub metrics_port: u16,
    pub record_file: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("DEDUP_CAPACITY must be >= 1")]
    ZeroDedupCapacity,
    #[error("{0} is required for venue mode {1}")]
    MissingCredential(&'static str, &'static str),
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn mode_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    parse: fn(&str) -> Option<T>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(v) => parse(&v).ok_or(ConfigError::Invalid { key, value: v }),
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = parse_or(lookup, key, default_ms)?;
    if ms == 0 {
        return Err(ConfigError::Invalid { key, value: "0".into() });
    }
    Ok(Duration::from_millis(ms))
}

impl Settings {
    /// Build settings from any key lookup (env in production, map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
        let instrument = lookup("INSTRUMENT")
            .or_else(|| lookup("SYMBOL"))
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "BTCUSDT".to_string());

        // ===== Venue =====
        let venue_mode = mode_or(&lookup, "VENUE_MODE", VenueMode::parse, VenueMode::Mock)?;
        let rest_url = lookup("BINANCE_REST_URL").unwrap_or_else(|| venue_mode.default_rest_url().to_string());
        let credentials = match venue_mode {
            VenueMode::Mock => None,
            VenueMode::BinanceTestnet | VenueMode::BinanceMainnet => {
                let api_key = lookup("BINANCE_API_KEY")
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::MissingCredential("BINANCE_API_KEY", venue_mode.as_str()))?;
                let api_secret = lookup("BINANCE_API_SECRET")
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::MissingCredential("BINANCE_API_SECRET", venue_mode.as_str()))?;
                Some(VenueCredentials { api_key, api_secret })
            }
        };
        let recv_window = parse_or(&lookup, "BINANCE_RECV_WINDOW", 5000u64)?;

        // ===== Store =====
        let store_mode = mode_or(&lookup, "STORE_MODE", StoreMode::parse, StoreMode::Memory)?;
        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string());
        let position_key = lookup("POSITION_KEY").unwrap_or_else(|| "position".to_string());
        let execution_ids_key = lookup("EXECUTION_IDS_KEY").unwrap_or_else(|| "recent_execution_ids".to_string());

        // ===== Ledger =====
        let capacity: usize = parse_or(&lookup, "DEDUP_CAPACITY", 500)?;
        let dedup_capacity = NonZeroUsize::new(capacity).ok_or(ConfigError::ZeroDedupCapacity)?;
        let page_size = parse_or(&lookup, "PAGE_SIZE", 100usize)?.max(1);
        let reseed = mode_or(&lookup, "RESEED_SOURCE", ReseedSource::parse, ReseedSource::Store)?;
        let reseed_trades = parse_or(&lookup, "RESEED_TRADES", dedup_capacity.get())?;
        let drift_tolerance: Decimal = parse_or(&lookup, "DRIFT_TOLERANCE", Decimal::new(1, 8))?;

        // ===== Scheduling =====
        let intervals = Intervals {
            ingest: millis(&lookup, "INGEST_INTERVAL_MS", 10_000)?,
            update: millis(&lookup, "UPDATE_INTERVAL_MS", 1_000)?,
            reconcile: millis(&lookup, "RECONCILE_INTERVAL_MS", 10_000)?,
            status: millis(&lookup, "STATUS_INTERVAL_MS", 5_000)?,
        };
        let request_timeout = millis(&lookup, "REQUEST_TIMEOUT_MS", 30_000)?;

        let metrics_port = parse_or(&lookup, "METRICS_PORT", 9898u16)?;
        let record_file = lookup("RECORD_FILE").filter(|s| !s.trim().is_empty());

        Ok(Settings {
            instrument,
            venue_mode,
            rest_url,
            credentials,
            recv_window,
            store_mode,
            redis_url,
            position_key,
            execution_ids_key,
            dedup_capacity,
            page_size,
            reseed,
            reseed_trades,
            drift_tolerance: drift_tolerance.abs(),
            intervals,
            request_timeout,
            metrics_port,
            record_file,
        })
    }
}

pub fn load() -> Result<Settings, ConfigError> {
    // Pastikan .env dibaca (agar REDIS_URL, BINANCE_API_KEY, dll ter-load)
    let _ = dotenv();
    Settings::from_lookup(|k| env::var(k).ok())
}
