//! breakwatch — breakout confirmation and outcome tracking
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the event ledger, resolves the symbol universe and runs the
//! scan loop until Ctrl+C, then drains outcome tracking before exiting.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use breakwatch::config::{self, AppConfig};
use breakwatch::dashboard::{self, routes::DashboardState};
use breakwatch::engine::confirmation::ConfirmationEngine;
use breakwatch::engine::scanner::{resolve_universe, ScanSettings, Scanner};
use breakwatch::engine::tracker::{OutcomeTracker, RetryPolicy, SampleReport, SampleStatus, TrackingStats};
use breakwatch::feed::kraken::KrakenClient;
use breakwatch::feed::FeedAdapter;
use breakwatch::ledger::EventLedger;
use breakwatch::notify::telegram::TelegramNotifier;
use breakwatch::notify::Notifier;

const BANNER: &str = r#"
  _                    _                    _       _
 | |__  _ __ ___  __ _| | ____      ____ _| |_ ___| |__
 | '_ \| '__/ _ \/ _` | |/ /\ \ /\ / / _` | __/ __| '_ \
 | |_) | | |  __/ (_| |   <  \ V  V / (_| | || (__| | | |
 |_.__/|_|  \___|\__,_|_|\_\  \_/\_/ \__,_|\__\___|_| |_|

  Multi-timeframe breakout confirmation
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        ledger = %cfg.ledger.path.display(),
        interval_secs = cfg.scanner.interval_secs,
        offsets_secs = ?cfg.tracking.offsets_secs,
        "breakwatch starting up"
    );

    // -- Initialise components -------------------------------------------

    let feed: Arc<dyn FeedAdapter> = Arc::new(KrakenClient::new(&cfg.feed)?);
    let ledger = EventLedger::open(&cfg.ledger)?;
    let symbols = resolve_universe(&cfg.scanner, feed.as_ref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (tracker, reports) = OutcomeTracker::new(
        Arc::clone(&feed),
        ledger.clone(),
        RetryPolicy::from(&cfg.tracking),
        shutdown_rx.clone(),
    );
    let tracker = Arc::new(tracker);

    let engine = ConfirmationEngine::new(
        Arc::clone(&feed),
        cfg.confirmation.indicator_params(),
        cfg.confirmation.threshold_policy(),
        cfg.feed.candle_count,
        cfg.confirmation.min_candles,
    );

    let settings = ScanSettings {
        timeframes: cfg.confirmation.timeframes.clone(),
        offsets: cfg.tracking.offsets(),
        interval: Duration::from_secs(cfg.scanner.interval_secs),
    };
    let mut scanner = Scanner::new(
        engine,
        ledger.clone(),
        Arc::clone(&tracker),
        symbols,
        settings,
        shutdown_rx.clone(),
    );

    if cfg.alerts.enabled {
        match TelegramNotifier::from_config(&cfg.alerts) {
            Ok(n) => {
                info!("Telegram alerts enabled");
                scanner = scanner.with_notifier(Arc::new(n) as Arc<dyn Notifier>);
            }
            Err(e) => warn!(error = %e, "Alerts enabled but Telegram is not configured, continuing without"),
        }
    }

    let status = if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(ledger.clone()));
        match dashboard::spawn_dashboard(Arc::clone(&state), cfg.dashboard.port, shutdown_rx.clone()).await {
            Ok(_) => {
                scanner = scanner.with_status(Arc::clone(&state));
                Some(state)
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Dashboard failed to start, continuing without");
                None
            }
        }
    } else {
        None
    };

    let consumer = tokio::spawn(consume_reports(reports, status));

    // -- Main loop -------------------------------------------------------

    info!("Entering main loop. Press Ctrl+C to stop.");
    tokio::select! {
        cycles = scanner.run() => {
            info!(cycles, "Scan loop exited");
        }
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Shutdown signal received."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    tracker.drain().await;
    drop(scanner);
    drop(tracker);
    if let Err(e) = consumer.await {
        error!(error = %e, "Tracking report consumer failed");
    }

    match ledger.summary().await {
        Ok(summary) => info!(
            events = summary.total,
            pending = summary.pending,
            resolved = summary.resolved,
            win_rate_pct = ?summary.win_rate_pct,
            "breakwatch shut down cleanly."
        ),
        Err(e) => warn!(error = %e, "breakwatch shut down; ledger summary unavailable"),
    }

    Ok(())
}

/// Tally finished samples until every tracker handle is gone.
async fn consume_reports(
    mut reports: mpsc::UnboundedReceiver<SampleReport>,
    status: Option<Arc<DashboardState>>,
) -> TrackingStats {
    let mut stats = TrackingStats::default();
    while let Some(report) = reports.recv().await {
        if let SampleStatus::PersistFailed = report.status {
            warn!(
                symbol = %report.symbol,
                event_timestamp = %report.event_timestamp,
                "Outcome left pending after persistence failure"
            );
        }
        stats.record(&report.status);
        if let Some(status) = &status {
            status.tracking.write().await.record(&report.status);
        }
    }
    info!(finished = stats.finished(), resolved = stats.resolved, "Tracking report consumer stopped");
    stats
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("breakwatch=info"));

    let json_logging = std::env::var("BREAKWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
