//! End-to-end scan scenarios.

use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use breakwatch::config::{AppConfig, LedgerConfig};
use breakwatch::engine::confirmation::{ConfirmationEngine, RELAXED_THRESHOLD, STRICT_THRESHOLD};
use breakwatch::engine::scanner::{ScanSettings, Scanner};
use breakwatch::engine::tracker::{OutcomeTracker, RetryPolicy, SampleReport, SampleStatus};
use breakwatch::feed::FeedAdapter;
use breakwatch::ledger::EventLedger;
use breakwatch::types::{Outcome, Timeframe};

use crate::mock_feed::{breakout_window, MockFeed};

const TIMEFRAMES: [Timeframe; 4] = [Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H4];

struct Pipeline {
    scanner: Scanner,
    engine: ConfirmationEngine,
    tracker: Arc<OutcomeTracker>,
    ledger: EventLedger,
    reports: mpsc::UnboundedReceiver<SampleReport>,
    _shutdown: watch::Sender<bool>,
    path: PathBuf,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Wire the pipeline the way `main` does, with default cutoffs.
fn pipeline(feed: Arc<MockFeed>, symbols: &[&str], offsets_secs: &[u64]) -> Pipeline {
    let cfg = AppConfig::default();
    let feed: Arc<dyn FeedAdapter> = feed;

    let mut path = std::env::temp_dir();
    path.push(format!("breakwatch_it_{}.csv", uuid::Uuid::new_v4()));
    let ledger = EventLedger::open(&LedgerConfig {
        path: path.clone(),
        ..cfg.ledger.clone()
    })
    .unwrap();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let (tracker, reports) = OutcomeTracker::new(
        Arc::clone(&feed),
        ledger.clone(),
        RetryPolicy::from(&cfg.tracking),
        shutdown_rx.clone(),
    );
    let tracker = Arc::new(tracker);

    let make_engine = || {
        ConfirmationEngine::new(
            Arc::clone(&feed),
            cfg.confirmation.indicator_params(),
            cfg.confirmation.threshold_policy(),
            cfg.feed.candle_count,
            cfg.confirmation.min_candles,
        )
    };

    let scanner = Scanner::new(
        make_engine(),
        ledger.clone(),
        Arc::clone(&tracker),
        symbols.iter().map(|s| s.to_string()).collect(),
        ScanSettings {
            timeframes: TIMEFRAMES.to_vec(),
            offsets: offsets_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            interval: Duration::from_secs(cfg.scanner.interval_secs),
        },
        shutdown_rx,
    );

    Pipeline {
        scanner,
        engine: make_engine(),
        tracker,
        ledger,
        reports,
        _shutdown: shutdown,
        path,
    }
}

/// Four confirming timeframes in a quiet, thin market.
fn quiet_feed() -> Arc<MockFeed> {
    let feed = Arc::new(MockFeed::new(&["ETH/USD"]));
    feed.set_windows("ETH/USD", &TIMEFRAMES, breakout_window(1.0, 0.001, 5.0, 0.001));
    feed
}

/// Four confirming timeframes, normal volatility, heavy volume.
fn active_feed() -> Arc<MockFeed> {
    let feed = Arc::new(MockFeed::new(&["ETH/USD"]));
    feed.set_windows("ETH/USD", &TIMEFRAMES, breakout_window(100.0, 1.0, 8_000.0, 0.5));
    feed
}

#[tokio::test(start_paused = true)]
async fn quiet_market_needs_six_votes() {
    let p = pipeline(quiet_feed(), &["ETH/USD"], &[60]);

    let result = p.engine.evaluate("ETH/USD", &TIMEFRAMES).await;
    assert_eq!(result.confirmations, 4);
    assert_eq!(result.adaptive_threshold, STRICT_THRESHOLD);
    assert!(!result.confirmed);

    let report = p.scanner.run_cycle(1).await;
    assert_eq!(report.scanned, 1);
    assert_eq!(report.confirmed, 0);
    assert_eq!(report.recorded, 0);
    assert_eq!(p.tracker.in_flight(), 0);
    assert!(p.ledger.recent(10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn active_market_records_and_tracks_every_offset() {
    let feed = active_feed();
    feed.set_price("ETH/USD", 103.25);
    let mut p = pipeline(Arc::clone(&feed), &["ETH/USD"], &[300, 900, 3600]);

    let result = p.engine.evaluate("ETH/USD", &TIMEFRAMES).await;
    assert_eq!(result.confirmations, 4);
    assert_eq!(result.adaptive_threshold, RELAXED_THRESHOLD);
    assert!(result.confirmed);
    assert_eq!(result.breakout_price, Some(101.5));

    let report = p.scanner.run_cycle(1).await;
    assert_eq!(report.recorded, 1);
    assert_eq!(p.tracker.in_flight(), 3);

    let events = p.ledger.recent(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entry_price, dec!(101.5));
    assert_eq!(events[0].target_price, dec!(106.575));
    assert_eq!(events[0].stop_loss, dec!(99.47));
    assert!(events[0].is_pending());

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(p.reports.recv().await.unwrap().status);
    }
    assert_eq!(statuses[0], SampleStatus::Resolved(dec!(103.25)));
    assert!(statuses[1..]
        .iter()
        .all(|s| *s == SampleStatus::AlreadyResolved(dec!(103.25))));
    p.tracker.drain().await;

    let events = p.ledger.recent(10).await.unwrap();
    assert_eq!(events[0].outcome, Outcome::Resolved(dec!(103.25)));
    let contents = std::fs::read_to_string(&p.path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.trim_end().ends_with(",103.25"));
}

#[tokio::test]
async fn repeated_breakout_is_recorded_once() {
    let p = pipeline(active_feed(), &["ETH/USD"], &[3600]);

    let first = p.scanner.run_cycle(1).await;
    let second = p.scanner.run_cycle(2).await;
    assert_eq!((first.recorded, first.duplicates), (1, 0));
    assert_eq!((second.recorded, second.duplicates), (0, 1));
    assert_eq!(p.ledger.recent(10).await.unwrap().len(), 1);
    assert_eq!(p.tracker.in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn persistent_price_failure_leaves_outcome_pending() {
    let feed = active_feed();
    feed.fail_prices("503 Service Unavailable");
    let mut p = pipeline(Arc::clone(&feed), &["ETH/USD"], &[60]);

    assert_eq!(p.scanner.run_cycle(1).await.recorded, 1);
    let sample = p.reports.recv().await.unwrap();
    assert_eq!(sample.status, SampleStatus::Exhausted);
    assert_eq!(sample.attempts, 4);
    assert_eq!(feed.price_calls(), 4);
    p.tracker.drain().await;

    let contents = std::fs::read_to_string(&p.path).unwrap();
    assert!(contents.trim_end().ends_with(",N/A"));
    let summary = p.ledger.summary().await.unwrap();
    assert_eq!(summary.pending, 1);
}

#[tokio::test]
async fn unknown_symbol_is_skipped() {
    let p = pipeline(active_feed(), &["NOPE/USD", "ETH/USD"], &[3600]);

    let report = p.scanner.run_cycle(1).await;
    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.recorded, 1);
}
