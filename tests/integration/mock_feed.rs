//! Mock market-data feed for integration testing.
//!
//! Provides a deterministic `FeedAdapter` that serves canned candle
//! windows and prices, all in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use breakwatch::feed::FeedAdapter;
use breakwatch::types::{Candle, Timeframe};

/// A mock feed for deterministic testing.
///
/// Windows are keyed by symbol and timeframe; a missing window is a fetch
/// error, like an unknown pair on a real exchange.
pub struct MockFeed {
    windows: Mutex<HashMap<(String, Timeframe), Vec<Candle>>>,
    prices: Mutex<HashMap<String, f64>>,
    symbols: Vec<String>,
    /// If set, every price request fails with this error.
    price_error: Mutex<Option<String>>,
    price_calls: AtomicUsize,
}

impl MockFeed {
    pub fn new(symbols: &[&str]) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            price_error: Mutex::new(None),
            price_calls: AtomicUsize::new(0),
        }
    }

    /// Serve the same window on every listed timeframe.
    pub fn set_windows(&self, symbol: &str, timeframes: &[Timeframe], candles: Vec<Candle>) {
        let mut windows = self.windows.lock().unwrap();
        for tf in timeframes {
            windows.insert((symbol.to_string(), *tf), candles.clone());
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    /// Force all subsequent price requests to fail.
    pub fn fail_prices(&self, msg: &str) {
        *self.price_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedAdapter for MockFeed {
    async fn get_candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<Vec<Candle>> {
        let windows = self.windows.lock().unwrap();
        let window = windows
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| anyhow!("Unknown pair {symbol} on {timeframe}"))?;
        let start = window.len().saturating_sub(count);
        Ok(window[start..].to_vec())
    }

    async fn get_last_price(&self, symbol: &str) -> Result<f64> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.price_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("No ticker for {symbol}"))
    }

    async fn list_symbols(&self, _quote_currencies: &[String]) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }
}

/// 60 flat candles around `base` with the given half-range and volume,
/// ending on a close that clears the previous high by `jump`.
pub fn breakout_window(base: f64, half_range: f64, volume: f64, jump: f64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2025, 3, 18, 0, 0, 0).unwrap();
    (0..60)
        .map(|i| {
            let last = i == 59;
            let close = if last { base + half_range + jump } else { base };
            Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: base,
                high: if last { close + half_range } else { base + half_range },
                low: base - half_range,
                close,
                volume,
            }
        })
        .collect()
}
