//! Market-data feed integrations.
//!
//! Defines the `FeedAdapter` trait consumed by the confirmation engine and
//! the outcome tracker, and provides the Kraken public REST implementation.

pub mod kraken;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Candle, Timeframe};

/// Abstraction over a market-data source.
///
/// Every error is treated as transient by callers: the affected timeframe
/// or symbol is skipped for the cycle, or retried where a policy exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Fetch up to `count` candles for `symbol`, oldest first. The last
    /// candle may still be forming.
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>>;

    /// Latest traded price for `symbol`.
    async fn get_last_price(&self, symbol: &str) -> Result<f64>;

    /// Tradable symbols quoted in any of `quote_currencies`.
    async fn list_symbols(&self, quote_currencies: &[String]) -> Result<Vec<String>>;
}
