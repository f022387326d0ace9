//! Shared types for the breakout watcher.
//!
//! These types form the data model used across all modules: candles
//! supplied by the feed, the per-symbol confirmation verdict, and the
//! events persisted to the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Candle aggregation period.
///
/// Variants are declared fast→slow so the derived `Ord` matches duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: &'static [Timeframe] = &[
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Length of one candle in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown timeframe: {s}"))
    }
}

/// One OHLCV interval. Immutable once fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Indicator values derived from one timeframe's candle window.
/// Recomputed every cycle; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub atr: f64,
    pub short_ma: f64,
    pub long_ma: f64,
    /// Volume of the latest (possibly still forming) candle.
    pub volume: f64,
    pub close: f64,
    /// High of the latest candle.
    pub high: f64,
    /// High of the second-to-last candle, the last completed one.
    pub prior_high: f64,
}

impl IndicatorSnapshot {
    /// Percent distance of the latest close from the latest candle high.
    pub fn percent_off_high(&self) -> f64 {
        if self.high == 0.0 {
            return 0.0;
        }
        (self.close / self.high - 1.0) * 100.0
    }

    /// Whether this timeframe votes "yes": the close clears both the last
    /// completed candle's high and the medium moving average.
    pub fn confirms_breakout(&self) -> bool {
        self.close > self.prior_high && self.close > self.short_ma
    }
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Outcome of evaluating one symbol across its timeframes.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationResult {
    pub symbol: String,
    pub confirmations: u32,
    /// Close of the last confirming timeframe, in fast→slow order.
    pub breakout_price: Option<f64>,
    pub adaptive_threshold: u32,
    pub confirmed: bool,
    /// Snapshots for every timeframe that yielded usable data.
    pub snapshots: Vec<(Timeframe, IndicatorSnapshot)>,
}

impl ConfirmationResult {
    /// Result for a symbol where no timeframe produced data.
    pub fn no_data(symbol: &str, base_threshold: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            confirmations: 0,
            breakout_price: None,
            adaptive_threshold: base_threshold,
            confirmed: false,
            snapshots: Vec::new(),
        }
    }

    pub fn timeframes_evaluated(&self) -> usize {
        self.snapshots.len()
    }

    /// Snapshot of the timeframe whose close became the breakout price.
    pub fn breakout_snapshot(&self) -> Option<&IndicatorSnapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|(_, s)| s.confirms_breakout())
            .map(|(_, s)| s)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Outcome slot of a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "price", rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Resolved(Decimal),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    pub fn price(&self) -> Option<Decimal> {
        match self {
            Outcome::Pending => None,
            Outcome::Resolved(p) => Some(*p),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Resolved(p) => write!(f, "{p}"),
        }
    }
}

/// A confirmed breakout persisted in the ledger.
/// Identity is `(symbol, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub entry_price: Decimal,
    pub target_price: Decimal,
    pub stop_loss: Decimal,
    pub outcome: Outcome,
}

impl Event {
    pub fn is_pending(&self) -> bool {
        self.outcome.is_pending()
    }

    /// Return of the resolved outcome relative to entry, in percent.
    pub fn return_pct(&self) -> Option<Decimal> {
        let price = self.outcome.price()?;
        if self.entry_price.is_zero() {
            return None;
        }
        Some((price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} entry={} target={} stop={} outcome={}",
            self.timestamp.to_rfc3339(),
            self.symbol,
            self.entry_price,
            self.target_price,
            self.stop_loss,
            self.outcome,
        )
    }
}

/// Result of `EventLedger::append_if_new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(Event),
    /// An unresolved event for the symbol already sits in the dedup window.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
