//! Event ledger.
//!
//! The ledger file is the single shared mutable resource. A dedicated
//! writer thread owns the [`LedgerStore`] exclusively and processes
//! commands one at a time, so the dedup read, appends and outcome rewrites
//! never interleave. [`EventLedger`] is the cheap, cloneable handle the
//! rest of the process talks to.

pub mod store;
pub mod summary;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::types::{AppendOutcome, Event};
use store::LedgerStore;
use summary::LedgerSummary;

/// Commands queued ahead of the writer before senders wait.
const COMMAND_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to open ledger {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to persist ledger entry for {symbol} @ {timestamp}: {source}")]
    Persist {
        symbol: String,
        timestamp: DateTime<Utc>,
        source: std::io::Error,
    },

    #[error("Ledger writer is not running")]
    Unavailable,
}

enum Command {
    Append {
        symbol: String,
        entry_price: Decimal,
        reply: oneshot::Sender<Result<AppendOutcome, LedgerError>>,
    },
    Resolve {
        symbol: String,
        outcome_price: Decimal,
        reply: oneshot::Sender<Result<bool, LedgerError>>,
    },
    ResolveEvent {
        symbol: String,
        timestamp: DateTime<Utc>,
        outcome_price: Decimal,
        reply: oneshot::Sender<Result<bool, LedgerError>>,
    },
    Recent {
        limit: usize,
        reply: oneshot::Sender<Vec<Event>>,
    },
    Summary {
        reply: oneshot::Sender<LedgerSummary>,
    },
}

/// Handle to the ledger writer. Clones share the same writer; the writer
/// exits once every handle is dropped.
#[derive(Clone)]
pub struct EventLedger {
    tx: mpsc::Sender<Command>,
}

impl EventLedger {
    /// Load the ledger and start its writer thread.
    ///
    /// Fails if the file cannot be opened; callers treat that as fatal.
    pub fn open(cfg: &LedgerConfig) -> Result<Self, LedgerError> {
        let store = LedgerStore::open(cfg)?;
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        std::thread::Builder::new()
            .name("ledger-writer".into())
            .spawn(move || run_writer(store, rx))
            .map_err(|source| LedgerError::Open {
                path: cfg.path.clone(),
                source,
            })?;

        Ok(Self { tx })
    }

    /// Append a pending event unless `symbol` already has one in the dedup
    /// window. The event is durably on disk when this returns `Appended`.
    pub async fn append_if_new(
        &self,
        symbol: &str,
        entry_price: Decimal,
    ) -> Result<AppendOutcome, LedgerError> {
        self.request(|reply| Command::Append {
            symbol: symbol.to_string(),
            entry_price,
            reply,
        })
        .await?
    }

    /// Record `outcome_price` on the newest pending event for `symbol`.
    /// `Ok(false)` means there was nothing to resolve.
    pub async fn resolve_pending(
        &self,
        symbol: &str,
        outcome_price: Decimal,
    ) -> Result<bool, LedgerError> {
        self.request(|reply| Command::Resolve {
            symbol: symbol.to_string(),
            outcome_price,
            reply,
        })
        .await?
    }

    /// Record `outcome_price` on the event appended for `symbol` at
    /// `timestamp`. `Ok(false)` means that event is gone or already resolved.
    pub async fn resolve_event(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        outcome_price: Decimal,
    ) -> Result<bool, LedgerError> {
        self.request(|reply| Command::ResolveEvent {
            symbol: symbol.to_string(),
            timestamp,
            outcome_price,
            reply,
        })
        .await?
    }

    /// The newest `limit` events, oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Event>, LedgerError> {
        self.request(|reply| Command::Recent { limit, reply }).await
    }

    pub async fn summary(&self) -> Result<LedgerSummary, LedgerError> {
        self.request(|reply| Command::Summary { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, LedgerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| LedgerError::Unavailable)?;
        rx.await.map_err(|_| LedgerError::Unavailable)
    }
}

fn run_writer(mut store: LedgerStore, mut rx: mpsc::Receiver<Command>) {
    debug!(path = %store.path().display(), "Ledger writer started");

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            Command::Append {
                symbol,
                entry_price,
                reply,
            } => {
                let _ = reply.send(store.append_if_new(&symbol, entry_price));
            }
            Command::Resolve {
                symbol,
                outcome_price,
                reply,
            } => {
                let _ = reply.send(store.resolve_pending(&symbol, outcome_price));
            }
            Command::ResolveEvent {
                symbol,
                timestamp,
                outcome_price,
                reply,
            } => {
                let _ = reply.send(store.resolve_event(&symbol, timestamp, outcome_price));
            }
            Command::Recent { limit, reply } => {
                let _ = reply.send(store.recent(limit));
            }
            Command::Summary { reply } => {
                let _ = reply.send(store.summary());
            }
        }
    }

    info!(path = %store.path().display(), "Ledger writer stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
