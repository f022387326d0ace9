//! Kraken public REST market data.
//!
//! API docs: https://docs.kraken.com/api/docs/rest-api/get-ohlc-data
//! Base URL: https://api.kraken.com/0/public/
//! Auth: Not required for market data.
//!
//! Symbols are handled in Kraken's `BASE/QUOTE` websocket form (`XBT/USD`);
//! the REST `pair` parameter is the same string without the slash.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::FeedAdapter;
use crate::config::FeedConfig;
use crate::types::{Candle, Timeframe};

// ---------------------------------------------------------------------------
// API response types (Kraken JSON → Rust)
// ---------------------------------------------------------------------------

/// Every Kraken response wraps its payload this way; a non-empty `error`
/// array means the call failed even on HTTP 200.
#[derive(Debug, Deserialize)]
struct KrakenEnvelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

impl<T> KrakenEnvelope<T> {
    fn into_result(self) -> Result<T> {
        if !self.error.is_empty() {
            bail!("Kraken API error: {}", self.error.join("; "));
        }
        self.result.ok_or_else(|| anyhow!("Kraken response has no result"))
    }
}

/// `[time, open, high, low, close, vwap, volume, count]`
type OhlcRow = (i64, String, String, String, String, String, String, u64);

#[derive(Debug, Deserialize)]
struct TickerInfo {
    /// Last trade closed: `[price, lot volume]`.
    c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AssetPair {
    #[serde(default)]
    wsname: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Kraken market-data client.
pub struct KrakenClient {
    http: Client,
    base_url: String,
}

impl KrakenClient {
    pub fn new(cfg: &FeedConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent("breakwatch/0.1.0")
            .build()
            .context("Failed to build HTTP client for Kraken")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// REST pair name for a `BASE/QUOTE` symbol.
    pub fn pair_param(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    async fn get<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        let url = format!("{}/0/public/{path_and_query}", self.base_url);
        debug!(url = %url, "Kraken request");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Kraken API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Kraken API error {status}: {body}");
        }

        let envelope: KrakenEnvelope<T> = resp
            .json()
            .await
            .context("Failed to parse Kraken response")?;
        envelope.into_result()
    }
}

#[async_trait]
impl FeedAdapter for KrakenClient {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let query = format!(
            "OHLC?pair={}&interval={}",
            urlencoding::encode(&Self::pair_param(symbol)),
            timeframe.minutes(),
        );
        let result: HashMap<String, serde_json::Value> = self
            .get(&query)
            .await
            .with_context(|| format!("OHLC fetch failed for {symbol} {timeframe}"))?;
        parse_ohlc(result, count).with_context(|| format!("Bad OHLC data for {symbol} {timeframe}"))
    }

    async fn get_last_price(&self, symbol: &str) -> Result<f64> {
        let query = format!("Ticker?pair={}", urlencoding::encode(&Self::pair_param(symbol)));
        let result: HashMap<String, TickerInfo> = self
            .get(&query)
            .await
            .with_context(|| format!("Ticker fetch failed for {symbol}"))?;
        parse_ticker(result).with_context(|| format!("Bad ticker data for {symbol}"))
    }

    async fn list_symbols(&self, quote_currencies: &[String]) -> Result<Vec<String>> {
        let result: HashMap<String, AssetPair> = self
            .get("AssetPairs")
            .await
            .context("AssetPairs fetch failed")?;
        Ok(filter_pairs(result, quote_currencies))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_field(value: &str, field: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("invalid {field}: {value:?}"))
}

fn to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid candle time {secs}"))
}

/// The OHLC result holds one key per pair plus a `last` cursor.
fn parse_ohlc(result: HashMap<String, serde_json::Value>, count: usize) -> Result<Vec<Candle>> {
    let rows = result
        .into_iter()
        .find(|(k, _)| k != "last")
        .map(|(_, v)| v)
        .ok_or_else(|| anyhow!("no pair in OHLC result"))?;
    let rows: Vec<OhlcRow> = serde_json::from_value(rows).context("unexpected OHLC row shape")?;

    let skip = rows.len().saturating_sub(count);
    rows.into_iter()
        .skip(skip)
        .map(|(time, open, high, low, close, _vwap, volume, _count)| {
            Ok(Candle {
                timestamp: to_datetime(time)?,
                open: parse_field(&open, "open")?,
                high: parse_field(&high, "high")?,
                low: parse_field(&low, "low")?,
                close: parse_field(&close, "close")?,
                volume: parse_field(&volume, "volume")?,
            })
        })
        .collect()
}

fn parse_ticker(result: HashMap<String, TickerInfo>) -> Result<f64> {
    let info = result
        .into_values()
        .next()
        .ok_or_else(|| anyhow!("no pair in ticker result"))?;
    let last = info.c.first().ok_or_else(|| anyhow!("ticker has no last trade"))?;
    parse_field(last, "last price")
}

fn filter_pairs(result: HashMap<String, AssetPair>, quote_currencies: &[String]) -> Vec<String> {
    let mut symbols: Vec<String> = result
        .into_values()
        .filter(|p| p.status.as_deref().map_or(true, |s| s == "online"))
        .filter_map(|p| p.wsname)
        .filter(|ws| {
            ws.split_once('/')
                .is_some_and(|(_, quote)| quote_currencies.iter().any(|q| q.eq_ignore_ascii_case(quote)))
        })
        .collect();
    symbols.sort();
    symbols
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
