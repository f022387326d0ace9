//! Multi-timeframe breakout confirmation.
//!
//! Each timeframe with a usable candle window casts one vote; the number of
//! votes needed is set per symbol from the volatility and volume regime
//! across those same timeframes.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::feed::FeedAdapter;
use crate::indicators::{self, IndicatorParams};
use crate::types::{ConfirmationResult, IndicatorSnapshot, Timeframe};

/// Votes needed in a calm, average-volume market.
pub const BASE_THRESHOLD: u32 = 4;
/// Votes needed in a high-volatility or high-volume regime.
pub const RELAXED_THRESHOLD: u32 = 2;
/// Votes needed in a quiet or thin market.
pub const STRICT_THRESHOLD: u32 = 6;

// ---------------------------------------------------------------------------
// Threshold policy
// ---------------------------------------------------------------------------

/// Regime cutoffs for the adaptive threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub high_volatility_atr: f64,
    pub low_volatility_atr: f64,
    pub high_volume: f64,
    pub low_volume: f64,
}

impl ThresholdPolicy {
    /// First matching rule wins: volatility is checked before volume.
    pub fn threshold(&self, avg_atr: f64, avg_volume: f64) -> u32 {
        if avg_atr > self.high_volatility_atr {
            RELAXED_THRESHOLD
        } else if avg_atr < self.low_volatility_atr {
            STRICT_THRESHOLD
        } else if avg_volume > self.high_volume {
            RELAXED_THRESHOLD
        } else if avg_volume < self.low_volume {
            STRICT_THRESHOLD
        } else {
            BASE_THRESHOLD
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ConfirmationEngine {
    feed: Arc<dyn FeedAdapter>,
    params: IndicatorParams,
    policy: ThresholdPolicy,
    /// Candles requested per timeframe.
    fetch_count: usize,
    /// Shorter windows are excluded from voting.
    min_candles: usize,
}

impl ConfirmationEngine {
    pub fn new(
        feed: Arc<dyn FeedAdapter>,
        params: IndicatorParams,
        policy: ThresholdPolicy,
        fetch_count: usize,
        min_candles: usize,
    ) -> Self {
        Self {
            feed,
            params,
            policy,
            fetch_count: fetch_count.max(min_candles),
            min_candles,
        }
    }

    /// Vote on a breakout for `symbol` across `timeframes`.
    ///
    /// Never fails: a timeframe whose fetch fails or whose window is too
    /// short is left out of both the vote and the threshold statistics.
    pub async fn evaluate(&self, symbol: &str, timeframes: &[Timeframe]) -> ConfirmationResult {
        let mut ordered = timeframes.to_vec();
        ordered.sort();
        ordered.dedup();

        // Fetches run concurrently; join_all keeps fast→slow order.
        let windows = join_all(
            ordered
                .iter()
                .map(|tf| self.feed.get_candles(symbol, *tf, self.fetch_count)),
        )
        .await;

        let mut snapshots: Vec<(Timeframe, IndicatorSnapshot)> = Vec::with_capacity(ordered.len());
        for (tf, window) in ordered.iter().zip(windows) {
            let candles = match window {
                Ok(c) => c,
                Err(e) => {
                    warn!(symbol, timeframe = %tf, error = %e, "Candle fetch failed, skipping timeframe");
                    continue;
                }
            };
            if candles.len() < self.min_candles {
                debug!(symbol, timeframe = %tf, candles = candles.len(), "Window too short, skipping timeframe");
                continue;
            }
            match indicators::snapshot(&candles, &self.params) {
                Some(snap) => snapshots.push((*tf, snap)),
                None => {
                    debug!(symbol, timeframe = %tf, "Indicators unavailable, skipping timeframe");
                }
            }
        }

        self.decide(symbol, snapshots)
    }

    /// Tally votes and apply the adaptive threshold to usable snapshots.
    pub fn decide(
        &self,
        symbol: &str,
        snapshots: Vec<(Timeframe, IndicatorSnapshot)>,
    ) -> ConfirmationResult {
        if snapshots.is_empty() {
            debug!(symbol, "No timeframe yielded data");
            return ConfirmationResult::no_data(symbol, BASE_THRESHOLD);
        }

        let mut confirmations = 0u32;
        let mut breakout_price = None;
        for (_, snap) in &snapshots {
            if snap.confirms_breakout() {
                confirmations += 1;
                breakout_price = Some(snap.close);
            }
        }

        let n = snapshots.len() as f64;
        let avg_atr = snapshots.iter().map(|(_, s)| s.atr).sum::<f64>() / n;
        let avg_volume = snapshots.iter().map(|(_, s)| s.volume).sum::<f64>() / n;
        let adaptive_threshold = self.policy.threshold(avg_atr, avg_volume);
        let confirmed = confirmations >= adaptive_threshold;

        debug!(
            symbol,
            timeframes = snapshots.len(),
            confirmations,
            avg_atr,
            avg_volume,
            adaptive_threshold,
            confirmed,
            "Confirmation evaluated"
        );

        ConfirmationResult {
            symbol: symbol.to_string(),
            confirmations,
            breakout_price,
            adaptive_threshold,
            confirmed,
            snapshots,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
