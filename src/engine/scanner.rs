//! Scan loop.
//!
//! Walks the symbol universe once per cycle: evaluate, record confirmed
//! breakouts, alert and schedule outcome tracking for new events. One
//! symbol failing (error or panic) never stops the rest of the cycle.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rust_decimal::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::confirmation::ConfirmationEngine;
use super::sleep_or_shutdown;
use super::tracker::OutcomeTracker;
use crate::config::{is_valid_symbol, ScannerConfig};
use crate::dashboard::routes::AppState;
use crate::feed::FeedAdapter;
use crate::ledger::EventLedger;
use crate::notify::{format_alert, Notifier};
use crate::types::{AppendOutcome, Timeframe};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one symbol in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    NoData,
    NotConfirmed,
    Duplicate,
    Recorded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub scanned: usize,
    pub confirmed: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Shutdown arrived before the whole universe was scanned.
    pub interrupted: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: SymbolOutcome) {
        match outcome {
            SymbolOutcome::NoData | SymbolOutcome::NotConfirmed => {}
            SymbolOutcome::Duplicate => {
                self.confirmed += 1;
                self.duplicates += 1;
            }
            SymbolOutcome::Recorded => {
                self.confirmed += 1;
                self.recorded += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Timing and scope of the scan loop.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub timeframes: Vec<Timeframe>,
    pub offsets: Vec<Duration>,
    pub interval: Duration,
}

pub struct Scanner {
    engine: ConfirmationEngine,
    ledger: EventLedger,
    tracker: Arc<OutcomeTracker>,
    notifier: Option<Arc<dyn Notifier>>,
    status: Option<AppState>,
    symbols: Vec<String>,
    settings: ScanSettings,
    shutdown: watch::Receiver<bool>,
}

impl Scanner {
    pub fn new(
        engine: ConfirmationEngine,
        ledger: EventLedger,
        tracker: Arc<OutcomeTracker>,
        symbols: Vec<String>,
        settings: ScanSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            ledger,
            tracker,
            notifier: None,
            status: None,
            symbols,
            settings,
            shutdown,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Publish each cycle report to the dashboard.
    pub fn with_status(mut self, status: AppState) -> Self {
        self.status = Some(status);
        self
    }

    /// Run cycles until shutdown. Returns the number of cycles started.
    pub async fn run(&self) -> u64 {
        let mut shutdown = self.shutdown.clone();
        let mut cycle = 0u64;

        info!(
            symbols = self.symbols.len(),
            timeframes = ?self.settings.timeframes.iter().map(|t| t.label()).collect::<Vec<_>>(),
            interval_secs = self.settings.interval.as_secs(),
            "Entering scan loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            cycle += 1;
            let report = self.run_cycle(cycle).await;
            log_cycle_report(&report);
            if let Some(status) = &self.status {
                *status.last_cycle.write().await = Some(report.clone());
            }
            if report.interrupted {
                break;
            }

            debug!(secs = self.settings.interval.as_secs(), "Sleeping until next cycle");
            if !sleep_or_shutdown(&mut shutdown, self.settings.interval).await {
                break;
            }
        }

        info!(cycles = cycle, "Scan loop stopped");
        cycle
    }

    /// Scan the whole universe once.
    pub async fn run_cycle(&self, cycle: u64) -> CycleReport {
        let mut report = CycleReport {
            cycle,
            started_at: Some(Utc::now()),
            ..CycleReport::default()
        };
        info!(cycle, symbols = self.symbols.len(), "Starting cycle");

        for symbol in &self.symbols {
            if *self.shutdown.borrow() {
                info!(cycle, scanned = report.scanned, "Shutdown requested, ending cycle early");
                report.interrupted = true;
                break;
            }
            report.scanned += 1;

            match AssertUnwindSafe(self.process_symbol(symbol)).catch_unwind().await {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(symbol = %symbol, error = %format!("{e:#}"), "Symbol processing failed, continuing");
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(symbol = %symbol, panic = %panic_message(panic.as_ref()), "Symbol processing panicked, continuing");
                }
            }
        }

        report
    }

    /// Evaluate one symbol and act on a confirmed breakout.
    pub async fn process_symbol(&self, symbol: &str) -> Result<SymbolOutcome> {
        let result = self.engine.evaluate(symbol, &self.settings.timeframes).await;

        if result.timeframes_evaluated() == 0 {
            debug!(symbol, "No usable data");
            return Ok(SymbolOutcome::NoData);
        }
        debug!(
            symbol,
            confirmations = result.confirmations,
            threshold = result.adaptive_threshold,
            "Evaluated"
        );
        let price = match result.breakout_price {
            Some(p) if result.confirmed => p,
            _ => return Ok(SymbolOutcome::NotConfirmed),
        };

        let entry_price = Decimal::from_f64(price)
            .with_context(|| format!("Breakout price {price} is not representable"))?;

        match self.ledger.append_if_new(symbol, entry_price).await? {
            AppendOutcome::Duplicate => {
                info!(symbol, "Breakout already recorded, skipping");
                Ok(SymbolOutcome::Duplicate)
            }
            AppendOutcome::Appended(event) => {
                info!(
                    symbol,
                    price = %event.entry_price,
                    target = %event.target_price,
                    stop = %event.stop_loss,
                    confirmations = result.confirmations,
                    threshold = result.adaptive_threshold,
                    "Breakout confirmed and recorded"
                );

                if let Some(notifier) = &self.notifier {
                    let text = format_alert(symbol, price, result.breakout_snapshot());
                    if let Err(e) = notifier.send(&text).await {
                        warn!(symbol, error = %e, "Alert delivery failed");
                    }
                }

                self.tracker.track(&event, &self.settings.offsets);
                Ok(SymbolOutcome::Recorded)
            }
        }
    }
}

/// The symbols to scan: the configured list, or the feed's listing for the
/// configured quote currencies. Discovered symbols the ledger cannot store
/// are dropped.
pub async fn resolve_universe(cfg: &ScannerConfig, feed: &dyn FeedAdapter) -> Result<Vec<String>> {
    if !cfg.symbols.is_empty() {
        info!(count = cfg.symbols.len(), "Using configured symbols");
        return Ok(cfg.symbols.clone());
    }
    if !cfg.discover_symbols {
        bail!("scanner.symbols is empty and symbol discovery is disabled");
    }

    let discovered = feed
        .list_symbols(&cfg.quote_currencies)
        .await
        .context("Failed to discover tradable symbols")?;
    let (symbols, rejected): (Vec<String>, Vec<String>) =
        discovered.into_iter().partition(|s| is_valid_symbol(s));
    if !rejected.is_empty() {
        warn!(count = rejected.len(), rejected = ?rejected, "Dropping discovered symbols the ledger cannot store");
    }
    if symbols.is_empty() {
        bail!("Symbol discovery returned no usable pairs for {:?}", cfg.quote_currencies);
    }
    info!(count = symbols.len(), quotes = ?cfg.quote_currencies, "Discovered symbols");
    Ok(symbols)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle,
        scanned = report.scanned,
        confirmed = report.confirmed,
        recorded = report.recorded,
        duplicates = report.duplicates,
        failed = report.failed,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
