//! Delayed outcome tracking.
//!
//! For every recorded event one task per configured offset waits out its
//! delay, samples the last price (retrying on feed errors with a fixed
//! pause) and writes the price back through the ledger. Offsets never wait
//! on each other. Each task reports how it ended on the completion channel
//! returned by [`OutcomeTracker::new`].

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::sleep_or_shutdown;
use crate::config::TrackingConfig;
use crate::feed::FeedAdapter;
use crate::ledger::EventLedger;
use crate::types::Event;

// ---------------------------------------------------------------------------
// Policy and reports
// ---------------------------------------------------------------------------

/// Retries after the first failed sample, with a fixed pause in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            pause: Duration::from_secs(10),
        }
    }
}

impl From<&TrackingConfig> for RetryPolicy {
    fn from(cfg: &TrackingConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            pause: Duration::from_secs(cfg.retry_pause_secs),
        }
    }
}

/// How one (event, offset) sampling task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleStatus {
    /// Price written to the event's outcome.
    Resolved(Decimal),
    /// Another offset of the same event already wrote the outcome.
    AlreadyResolved(Decimal),
    /// The event's row was missing or already resolved in the ledger.
    NoPendingRow(Decimal),
    /// Every attempt failed; the outcome stays pending.
    Exhausted,
    /// The ledger write failed; the outcome stays pending.
    PersistFailed,
    /// Shutdown arrived before the sample was taken.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SampleReport {
    pub symbol: String,
    pub event_timestamp: DateTime<Utc>,
    pub offset: Duration,
    /// Price fetches made, including the first.
    pub attempts: u32,
    pub status: SampleStatus,
}

/// Running totals of finished samples, by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackingStats {
    pub resolved: u64,
    pub already_resolved: u64,
    pub no_pending_row: u64,
    pub exhausted: u64,
    pub persist_failed: u64,
    pub cancelled: u64,
}

impl TrackingStats {
    pub fn record(&mut self, status: &SampleStatus) {
        let counter = match status {
            SampleStatus::Resolved(_) => &mut self.resolved,
            SampleStatus::AlreadyResolved(_) => &mut self.already_resolved,
            SampleStatus::NoPendingRow(_) => &mut self.no_pending_row,
            SampleStatus::Exhausted => &mut self.exhausted,
            SampleStatus::PersistFailed => &mut self.persist_failed,
            SampleStatus::Cancelled => &mut self.cancelled,
        };
        *counter += 1;
    }

    pub fn finished(&self) -> u64 {
        self.resolved
            + self.already_resolved
            + self.no_pending_row
            + self.exhausted
            + self.persist_failed
            + self.cancelled
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct OutcomeTracker {
    feed: Arc<dyn FeedAdapter>,
    ledger: EventLedger,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    tasks: Mutex<JoinSet<()>>,
    in_flight: Arc<AtomicUsize>,
    reports: mpsc::UnboundedSender<SampleReport>,
}

/// Everything one sampling task owns.
struct SampleTask {
    feed: Arc<dyn FeedAdapter>,
    ledger: EventLedger,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    symbol: String,
    event_timestamp: DateTime<Utc>,
    offset: Duration,
    /// Shared by every offset of one event so the outcome is written once.
    written: Arc<AtomicBool>,
}

impl OutcomeTracker {
    pub fn new(
        feed: Arc<dyn FeedAdapter>,
        ledger: EventLedger,
        retry: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, mpsc::UnboundedReceiver<SampleReport>) {
        let (reports, rx) = mpsc::unbounded_channel();
        let tracker = Self {
            feed,
            ledger,
            retry,
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            reports,
        };
        (tracker, rx)
    }

    /// Schedule one sampling task per offset for a freshly recorded event.
    /// Returns the number of tasks scheduled.
    pub fn track(&self, event: &Event, offsets: &[Duration]) -> usize {
        let written = Arc::new(AtomicBool::new(false));
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        // Reap finished tasks so the set does not grow for the process lifetime.
        while let Some(res) = tasks.try_join_next() {
            log_join_error(res);
        }

        for &offset in offsets {
            let task = SampleTask {
                feed: Arc::clone(&self.feed),
                ledger: self.ledger.clone(),
                retry: self.retry,
                shutdown: self.shutdown.clone(),
                symbol: event.symbol.clone(),
                event_timestamp: event.timestamp,
                offset,
                written: Arc::clone(&written),
            };
            let reports = self.reports.clone();
            let in_flight = Arc::clone(&self.in_flight);

            in_flight.fetch_add(1, Ordering::SeqCst);
            tasks.spawn(async move {
                let report = task.run().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                let _ = reports.send(report);
            });
        }

        info!(
            symbol = %event.symbol,
            offsets = ?offsets.iter().map(|o| o.as_secs()).collect::<Vec<_>>(),
            "Outcome tracking scheduled"
        );
        offsets.len()
    }

    /// Sampling tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for every scheduled task to finish. After shutdown has been
    /// signalled this returns as soon as the tasks notice it.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let pending = tasks.len();
        if pending > 0 {
            info!(pending, "Waiting for outcome tracking tasks");
        }
        while let Some(res) = tasks.join_next().await {
            log_join_error(res);
        }
    }
}

fn log_join_error(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!(error = %e, "Outcome tracking task panicked");
        }
    }
}

impl SampleTask {
    async fn run(mut self) -> SampleReport {
        let (attempts, status) = self.sample().await;
        let report = SampleReport {
            symbol: self.symbol,
            event_timestamp: self.event_timestamp,
            offset: self.offset,
            attempts,
            status,
        };
        debug!(
            symbol = %report.symbol,
            offset_secs = report.offset.as_secs(),
            attempts = report.attempts,
            status = ?report.status,
            "Outcome sample finished"
        );
        report
    }

    async fn sample(&mut self) -> (u32, SampleStatus) {
        if !sleep_or_shutdown(&mut self.shutdown, self.offset).await {
            return (0, SampleStatus::Cancelled);
        }

        let mut attempts = 0u32;
        let price = loop {
            if attempts > 0 {
                if attempts > self.retry.max_retries {
                    warn!(
                        symbol = %self.symbol,
                        offset_secs = self.offset.as_secs(),
                        attempts,
                        "Could not fetch post-breakout price, outcome stays pending"
                    );
                    return (attempts, SampleStatus::Exhausted);
                }
                debug!(symbol = %self.symbol, retries_left = self.retry.max_retries + 1 - attempts, "Retrying post-breakout price fetch");
                if !sleep_or_shutdown(&mut self.shutdown, self.retry.pause).await {
                    return (attempts, SampleStatus::Cancelled);
                }
            }
            attempts += 1;

            match self.feed.get_last_price(&self.symbol).await {
                Ok(p) => match Decimal::from_f64(p).filter(|d| d.is_sign_positive() && !d.is_zero()) {
                    Some(price) => break price,
                    None => warn!(symbol = %self.symbol, price = p, attempt = attempts, "Feed returned an unusable price"),
                },
                Err(e) => {
                    warn!(symbol = %self.symbol, attempt = attempts, error = %e, "Post-breakout price fetch failed")
                }
            }
        };

        if self.written.swap(true, Ordering::SeqCst) {
            debug!(symbol = %self.symbol, offset_secs = self.offset.as_secs(), "Outcome already recorded by an earlier offset");
            return (attempts, SampleStatus::AlreadyResolved(price));
        }

        match self
            .ledger
            .resolve_event(&self.symbol, self.event_timestamp, price)
            .await
        {
            Ok(true) => {
                info!(
                    symbol = %self.symbol,
                    offset_mins = self.offset.as_secs() / 60,
                    price = %price,
                    "Post-breakout price recorded"
                );
                (attempts, SampleStatus::Resolved(price))
            }
            Ok(false) => (attempts, SampleStatus::NoPendingRow(price)),
            Err(e) => {
                self.written.store(false, Ordering::SeqCst);
                error!(
                    symbol = %self.symbol,
                    event_timestamp = %self.event_timestamp,
                    price = %price,
                    error = %e,
                    "Failed to record post-breakout price"
                );
                (attempts, SampleStatus::PersistFailed)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
