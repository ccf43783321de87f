// ===============================
// src/venue_binance.rs
// ===============================
//
// Binance USDⓈ-M futures (REST, SIGNED endpoints):
// - GET /fapi/v1/userTrades   -> executions terbaru (limit max 1000)
// - GET /fapi/v2/positionRisk -> open positions (authoritative snapshot)
//
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::binance::{encode_params, sign_query, timestamp_ms, PositionRisk, RawTrade};
use crate::config::VenueCredentials;
use crate::domain::{Execution, OpenPosition};
use crate::error::LedgerError;
use crate::metrics::EXECS_MALFORMED;
use crate::venue::VenueClient;

const MAX_TRADES_LIMIT: usize = 1000;

pub struct BinanceVenue {
    http: reqwest::Client,
    rest_base: String,
    api_key: String,
    api_secret: String,
    recv_window: u64,
}

impl BinanceVenue {
    pub fn new(rest_base: String, creds: VenueCredentials, recv_window: u64, timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            rest_base: rest_base.trim_end_matches('/').to_string(),
            api_key: creds.api_key,
            api_secret: creds.api_secret,
            recv_window,
        })
    }

    async fn signed_get<T: DeserializeOwned>(&self, path: &str, mut params: Vec<(&str, String)>) -> Result<T, LedgerError> {
        params.push(("recvWindow", self.recv_window.to_string()));
        params.push(("timestamp", timestamp_ms().to_string()));
        let query = encode_params(&params);
        let sig = sign_query(&self.api_secret, &query);
        let url = format!("{}{}?{}&signature={}", self.rest_base, path, query, sig);

        let rsp = self.http.get(url).header("X-MBX-APIKEY", &self.api_key).send().await?;
        let code = rsp.status();
        if !code.is_success() {
            // 401/403 auth, 418/429 rate limit, 5xx: semua transient dari sisi ledger
            let body = rsp.text().await.unwrap_or_default();
            return Err(LedgerError::VenueUnavailable(format!("{path}: {code} {body}")));
        }
        let body = rsp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Convert a page of raw trade records, dropping (and counting) malformed ones.
pub fn parse_trades(page: Vec<serde_json::Value>) -> Vec<Execution> {
    let mut out = Vec::with_capacity(page.len());
    for v in page {
        let parsed = serde_json::from_value::<RawTrade>(v)
            .map_err(|e| LedgerError::MalformedExecution(e.to_string()))
            .and_then(Execution::try_from);
        match parsed {
            Ok(exec) => out.push(exec),
            Err(e) => {
                EXECS_MALFORMED.inc();
                warn!(error = %e, "dropping malformed execution");
            }
        }
    }
    out
}

#[async_trait]
impl VenueClient for BinanceVenue {
    async fn fetch_recent_trades(&self, instrument: &str, limit: usize) -> Result<Vec<Execution>, LedgerError> {
        let limit = limit.clamp(1, MAX_TRADES_LIMIT);
        let page: Vec<serde_json::Value> = self
            .signed_get(
                "/fapi/v1/userTrades",
                vec![("symbol", instrument.to_ascii_uppercase()), ("limit", limit.to_string())],
            )
            .await?;
        debug!(instrument, records = page.len(), "userTrades page");
        Ok(parse_trades(page))
    }

    async fn fetch_open_positions(&self, instrument: &str) -> Result<Vec<OpenPosition>, LedgerError> {
        let rows: Vec<PositionRisk> = self
            .signed_get("/fapi/v2/positionRisk", vec![("symbol", instrument.to_ascii_uppercase())])
            .await?;
        let mut out = Vec::new();
        for row in rows.iter().filter(|r| r.symbol.eq_ignore_ascii_case(instrument)) {
            if let Some(p) = row.to_open_position()? {
                out.push(p);
            }
        }
        Ok(out)
    }
}
