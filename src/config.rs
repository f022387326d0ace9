//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a partial file is valid. Secrets
//! (the Telegram bot token) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::confirmation::ThresholdPolicy;
use crate::indicators::IndicatorParams;
use crate::types::Timeframe;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub feed: FeedConfig,
    pub confirmation: ConfirmationConfig,
    pub ledger: LedgerConfig,
    pub tracking: TrackingConfig,
    pub alerts: AlertsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    pub interval_secs: u64,
    /// Fixed symbol universe. When empty and `discover_symbols` is set,
    /// the universe is loaded from the feed at start-up.
    pub symbols: Vec<String>,
    pub discover_symbols: bool,
    pub quote_currencies: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            symbols: Vec::new(),
            discover_symbols: true,
            quote_currencies: vec!["USD".into(), "USDT".into(), "USDC".into()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Candles requested per timeframe.
    pub candle_count: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kraken.com".into(),
            timeout_secs: 30,
            candle_count: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeframes: Vec<Timeframe>,
    /// Windows shorter than this are excluded from voting.
    pub min_candles: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub high_volatility_atr: f64,
    pub low_volatility_atr: f64,
    pub high_volume: f64,
    pub low_volume: f64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H4],
            min_candles: 50,
            rsi_period: 14,
            atr_period: 14,
            short_ma_period: 20,
            long_ma_period: 50,
            high_volatility_atr: 50.0,
            low_volatility_atr: 0.05,
            high_volume: 5_000.0,
            low_volume: 10.0,
        }
    }
}

impl ConfirmationConfig {
    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            rsi_period: self.rsi_period,
            atr_period: self.atr_period,
            short_ma_period: self.short_ma_period,
            long_ma_period: self.long_ma_period,
        }
    }

    pub fn threshold_policy(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            high_volatility_atr: self.high_volatility_atr,
            low_volatility_atr: self.low_volatility_atr,
            high_volume: self.high_volume,
            low_volume: self.low_volume,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// Number of trailing events scanned for an unresolved duplicate.
    pub dedup_window: usize,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("breakout_log.csv"),
            dedup_window: 10,
            take_profit_pct: dec!(0.05),
            stop_loss_pct: dec!(0.02),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackingConfig {
    /// Delays after the event at which the price is re-sampled.
    pub offsets_secs: Vec<u64>,
    pub max_retries: u32,
    pub retry_pause_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            offsets_secs: vec![60],
            max_retries: 3,
            retry_pause_secs: 10,
        }
    }
}

impl TrackingConfig {
    pub fn offsets(&self) -> Vec<Duration> {
        self.offsets_secs.iter().map(|s| Duration::from_secs(*s)).collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub telegram_bot_token_env: String,
    pub telegram_chat_id_env: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            telegram_bot_token_env: "TELEGRAM_BOT_TOKEN".into(),
            telegram_chat_id_env: "TELEGRAM_CHAT_ID".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.confirmation;
        if c.timeframes.is_empty() {
            bail!("confirmation.timeframes must not be empty");
        }
        let needed = c.indicator_params().min_window();
        if c.min_candles < needed {
            bail!(
                "confirmation.min_candles ({}) must be at least {needed} for the configured indicator periods",
                c.min_candles
            );
        }
        if self.feed.candle_count < c.min_candles {
            bail!(
                "feed.candle_count ({}) must not be below confirmation.min_candles ({})",
                self.feed.candle_count,
                c.min_candles
            );
        }
        if c.low_volatility_atr > c.high_volatility_atr {
            bail!("confirmation.low_volatility_atr must not exceed high_volatility_atr");
        }
        if c.low_volume > c.high_volume {
            bail!("confirmation.low_volume must not exceed high_volume");
        }

        let l = &self.ledger;
        if l.dedup_window == 0 {
            bail!("ledger.dedup_window must be at least 1");
        }
        for (name, pct) in [("take_profit_pct", l.take_profit_pct), ("stop_loss_pct", l.stop_loss_pct)] {
            if pct <= Decimal::ZERO || pct >= Decimal::ONE {
                bail!("ledger.{name} must be between 0 and 1 (got {pct})");
            }
        }

        if self.tracking.offsets_secs.is_empty() {
            bail!("tracking.offsets_secs must not be empty");
        }

        if let Some(bad) = self.scanner.symbols.iter().find(|s| !is_valid_symbol(s)) {
            bail!("scanner.symbols contains an invalid symbol: {bad:?}");
        }
        if self.scanner.symbols.is_empty() && !self.scanner.discover_symbols {
            bail!("scanner.symbols is empty and discover_symbols is off");
        }
        Ok(())
    }
}

/// A symbol the ledger can store: non-blank and free of the field separator.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.trim().is_empty() && !symbol.contains(',')
}
