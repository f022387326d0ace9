//! Technical indicators computed over a candle window.
//!
//! RSI and ATR use Wilder smoothing seeded with a simple average of the
//! first `period` values, the same convention TA-Lib uses, so values line
//! up with what charting tools show for the same window.

use crate::types::{Candle, IndicatorSnapshot};

/// Periods used to build an [`IndicatorSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            short_ma_period: 20,
            long_ma_period: 50,
        }
    }
}

impl IndicatorParams {
    /// Fewest candles for which every indicator is defined.
    pub fn min_window(&self) -> usize {
        (self.rsi_period + 1)
            .max(self.atr_period + 1)
            .max(self.short_ma_period)
            .max(self.long_ma_period)
            .max(2)
    }
}

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    if window.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Relative Strength Index at the last close.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    if closes.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for pair in closes[..=period].windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let w = period as f64;
    for pair in closes[period..].windows(2) {
        let change = pair[1] - pair[0];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (w - 1.0) + gain) / w;
        avg_loss = (avg_loss * (w - 1.0) + loss) / w;
    }

    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return Some(50.0);
        }
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Average True Range at the last candle.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let c = &pair[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect();

    if true_ranges.iter().any(|tr| !tr.is_finite()) {
        return None;
    }

    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    let w = period as f64;
    for tr in &true_ranges[period..] {
        value = (value * (w - 1.0) + tr) / w;
    }
    Some(value)
}

/// Derive the full snapshot for a window, oldest candle first.
///
/// Returns `None` when the window is too short or any indicator is
/// undefined, which callers treat as "no signal" for that timeframe.
pub fn snapshot(candles: &[Candle], params: &IndicatorParams) -> Option<IndicatorSnapshot> {
    if candles.len() < params.min_window() {
        return None;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last = candles[candles.len() - 1];
    let prior = candles[candles.len() - 2];

    Some(IndicatorSnapshot {
        rsi: rsi(&closes, params.rsi_period)?,
        atr: atr(candles, params.atr_period)?,
        short_ma: sma(&closes, params.short_ma_period)?,
        long_ma: sma(&closes, params.long_ma_period)?,
        volume: last.volume,
        close: last.close,
        high: last.high,
        prior_high: prior.high,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
