//! File-backed event store.
//!
//! One event per line:
//! `timestamp,symbol,entry_price,target_price,stop_loss,outcome`, where a
//! pending outcome is the literal `N/A`. The whole file is mirrored in
//! memory; appends go straight to the end of the file and are fsynced,
//! outcome rewrites replace the file atomically via a temp file + rename.
//!
//! Not thread-safe on its own: the ledger writer thread owns it exclusively.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use super::summary::LedgerSummary;
use super::LedgerError;
use crate::config::LedgerConfig;
use crate::types::{AppendOutcome, Event, Outcome};

/// Literal stored in the outcome column until the event is resolved.
pub const PENDING_SENTINEL: &str = "N/A";

const FIELD_COUNT: usize = 6;

/// Decimal places kept for computed target and stop prices.
const PRICE_DP: u32 = 6;

// ---------------------------------------------------------------------------
// Line codec
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LineError {
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("unreadable record: {0}")]
    Record(String),

    #[error("invalid timestamp: {0:?}")]
    Timestamp(String),

    #[error("empty symbol")]
    EmptySymbol,

    #[error("invalid {field}: {value:?}")]
    Number { field: &'static str, value: String },
}

fn writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out)
}

fn write_event<W: Write>(wtr: &mut csv::Writer<W>, event: &Event) -> csv::Result<()> {
    let outcome = match event.outcome {
        Outcome::Pending => PENDING_SENTINEL.to_string(),
        Outcome::Resolved(price) => price.to_string(),
    };
    wtr.write_record([
        event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        event.symbol.clone(),
        event.entry_price.to_string(),
        event.target_price.to_string(),
        event.stop_loss.to_string(),
        outcome,
    ])
}

/// One ledger line for `event`, without the line terminator.
pub fn encode_line(event: &Event) -> io::Result<String> {
    let mut wtr = writer(Vec::new());
    write_event(&mut wtr, event)?;
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    let line = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(line.trim_end_matches('\n').to_string())
}

/// Accepts RFC 3339, and the `2025-03-18 07:59:57.123456+00:00` form
/// older logs were written with.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LineError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .map_err(|_| LineError::Timestamp(raw.to_string()))
}

fn parse_decimal(raw: &str, field: &'static str) -> Result<Decimal, LineError> {
    Decimal::from_str(raw).map_err(|_| LineError::Number {
        field,
        value: raw.to_string(),
    })
}

pub fn parse_line(line: &str) -> Result<Event, LineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let record = match rdr.records().next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => return Err(LineError::Record(e.to_string())),
        None => return Err(LineError::FieldCount(0)),
    };
    if record.len() != FIELD_COUNT {
        return Err(LineError::FieldCount(record.len()));
    }
    if record[1].is_empty() {
        return Err(LineError::EmptySymbol);
    }

    let outcome = if &record[5] == PENDING_SENTINEL {
        Outcome::Pending
    } else {
        Outcome::Resolved(parse_decimal(&record[5], "outcome")?)
    };

    Ok(Event {
        timestamp: parse_timestamp(&record[0])?,
        symbol: record[1].to_string(),
        entry_price: parse_decimal(&record[2], "entry_price")?,
        target_price: parse_decimal(&record[3], "target_price")?,
        stop_loss: parse_decimal(&record[4], "stop_loss")?,
        outcome,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A line of the ledger file. Lines that fail validation are kept verbatim
/// so rewriting the file never drops them.
#[derive(Debug, Clone)]
enum LedgerLine {
    Event(Event),
    Unparsed(String),
}

pub struct LedgerStore {
    path: PathBuf,
    lines: Vec<LedgerLine>,
    /// The file on disk does not end in a newline yet.
    needs_newline: bool,
    dedup_window: usize,
    take_profit_pct: Decimal,
    stop_loss_pct: Decimal,
}

impl LedgerStore {
    /// Load the ledger, creating an empty file if none exists.
    pub fn open(cfg: &LedgerConfig) -> Result<Self, LedgerError> {
        let path = cfg.path.clone();
        let open_err = |source: io::Error| LedgerError::Open {
            path: path.clone(),
            source,
        };

        // Surfaces permission problems at start-up rather than on first append.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;
        let contents = fs::read_to_string(&path).map_err(open_err)?;

        let mut lines = Vec::new();
        let mut skipped = 0usize;
        for (idx, raw) in contents.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            match parse_line(raw) {
                Ok(event) => lines.push(LedgerLine::Event(event)),
                Err(e) => {
                    warn!(path = %path.display(), line = idx + 1, error = %e, "Skipping malformed ledger line");
                    skipped += 1;
                    lines.push(LedgerLine::Unparsed(raw.to_string()));
                }
            }
        }

        let store = Self {
            needs_newline: !contents.is_empty() && !contents.ends_with('\n'),
            path,
            lines,
            dedup_window: cfg.dedup_window,
            take_profit_pct: cfg.take_profit_pct,
            stop_loss_pct: cfg.stop_loss_pct,
        };

        info!(
            path = %store.path.display(),
            events = store.events().count(),
            pending = store.events().filter(|e| e.is_pending()).count(),
            skipped,
            "Ledger loaded"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Valid events in append order.
    pub fn events(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.lines.iter().filter_map(|l| match l {
            LedgerLine::Event(e) => Some(e),
            LedgerLine::Unparsed(_) => None,
        })
    }

    /// The newest `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let mut out: Vec<Event> = self.events().rev().take(limit).cloned().collect();
        out.reverse();
        out
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary::from_events(self.events())
    }

    fn pending_in_window(&self, symbol: &str) -> bool {
        self.events()
            .rev()
            .take(self.dedup_window)
            .any(|e| e.symbol == symbol && e.is_pending())
    }

    /// Append a pending event for `symbol` unless one is already pending in
    /// the dedup window. Returns only after the line is fsynced.
    pub fn append_if_new(
        &mut self,
        symbol: &str,
        entry_price: Decimal,
    ) -> Result<AppendOutcome, LedgerError> {
        if self.pending_in_window(symbol) {
            info!(symbol, "Duplicate breakout, already recorded");
            return Ok(AppendOutcome::Duplicate);
        }

        let event = Event {
            timestamp: Utc::now().trunc_subsecs(6),
            symbol: symbol.to_string(),
            entry_price,
            target_price: (entry_price * (Decimal::ONE + self.take_profit_pct))
                .round_dp(PRICE_DP)
                .normalize(),
            stop_loss: (entry_price * (Decimal::ONE - self.stop_loss_pct))
                .round_dp(PRICE_DP)
                .normalize(),
            outcome: Outcome::Pending,
        };

        let persist_err = |source: io::Error| {
            error!(symbol, timestamp = %event.timestamp, error = %source, "Ledger append failed");
            LedgerError::Persist {
                symbol: symbol.to_string(),
                timestamp: event.timestamp,
                source,
            }
        };

        let mut line = String::new();
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(&encode_line(&event).map_err(persist_err)?);
        line.push('\n');

        self.append_raw(&line).map_err(persist_err)?;
        self.needs_newline = false;

        info!(
            symbol,
            entry = %event.entry_price,
            target = %event.target_price,
            stop = %event.stop_loss,
            "Breakout logged"
        );
        self.lines.push(LedgerLine::Event(event.clone()));
        Ok(AppendOutcome::Appended(event))
    }

    /// Write `outcome_price` into the newest pending event for `symbol`.
    /// Returns `false` when no such event exists.
    pub fn resolve_pending(
        &mut self,
        symbol: &str,
        outcome_price: Decimal,
    ) -> Result<bool, LedgerError> {
        let idx = self.lines.iter().rposition(|l| {
            matches!(l, LedgerLine::Event(e) if e.symbol == symbol && e.is_pending())
        });
        let Some(idx) = idx else {
            warn!(symbol, "No pending ledger entry to resolve");
            return Ok(false);
        };
        self.resolve_at(idx, outcome_price)
    }

    /// Write `outcome_price` into the event identified by `symbol` and
    /// `timestamp`. Returns `false` when that event is missing or already
    /// resolved; other events of the symbol are never touched.
    pub fn resolve_event(
        &mut self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        outcome_price: Decimal,
    ) -> Result<bool, LedgerError> {
        let idx = self.lines.iter().rposition(|l| {
            matches!(l, LedgerLine::Event(e) if e.symbol == symbol && e.timestamp == timestamp)
        });
        match idx {
            Some(idx) if matches!(&self.lines[idx], LedgerLine::Event(e) if e.is_pending()) => {
                self.resolve_at(idx, outcome_price)
            }
            Some(_) => {
                warn!(symbol, timestamp = %timestamp, "Ledger entry already resolved");
                Ok(false)
            }
            None => {
                warn!(symbol, timestamp = %timestamp, "No ledger entry to resolve");
                Ok(false)
            }
        }
    }

    fn resolve_at(&mut self, idx: usize, outcome_price: Decimal) -> Result<bool, LedgerError> {
        let LedgerLine::Event(event) = &mut self.lines[idx] else {
            return Ok(false);
        };
        event.outcome = Outcome::Resolved(outcome_price);
        let symbol = event.symbol.clone();
        let timestamp = event.timestamp;

        if let Err(source) = self.rewrite() {
            if let LedgerLine::Event(e) = &mut self.lines[idx] {
                e.outcome = Outcome::Pending;
            }
            error!(symbol = %symbol, timestamp = %timestamp, error = %source, "Ledger rewrite failed");
            return Err(LedgerError::Persist {
                symbol,
                timestamp,
                source,
            });
        }

        info!(symbol = %symbol, timestamp = %timestamp, outcome = %outcome_price, "Ledger outcome recorded");
        Ok(true)
    }

    /// Append `text`, cutting the file back to its previous length if the
    /// write fails part way. If even that fails, the next append starts on
    /// a fresh line so it cannot merge with the partial bytes.
    fn append_raw(&mut self, text: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let len = file.metadata()?.len();

        let result = file.write_all(text.as_bytes()).and_then(|_| file.sync_data());
        if result.is_err() {
            if let Err(e) = file.set_len(len).and_then(|_| file.sync_data()) {
                warn!(path = %self.path.display(), error = %e, "Could not roll back partial ledger append");
                self.needs_newline = true;
            }
        }
        result
    }

    /// Replace the file with the in-memory lines.
    fn rewrite(&self) -> io::Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let mut wtr = writer(Vec::new());
        for line in &self.lines {
            match line {
                LedgerLine::Event(e) => write_event(&mut wtr, e)?,
                LedgerLine::Unparsed(raw) => {
                    wtr.flush()?;
                    let mut out = std::mem::replace(&mut wtr, writer(Vec::new()))
                        .into_inner()
                        .map_err(|e| e.into_error())?;
                    out.extend_from_slice(raw.as_bytes());
                    out.push(b'\n');
                    wtr = writer(out);
                }
            }
        }
        let body = wtr.into_inner().map_err(|e| e.into_error())?;

        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        debug!(path = %self.path.display(), lines = self.lines.len(), "Ledger rewritten");
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn temp_config() -> LedgerConfig {
        let mut p = std::env::temp_dir();
        p.push(format!("breakwatch_test_ledger_{}.csv", uuid::Uuid::new_v4()));
        LedgerConfig {
            path: p,
            ..LedgerConfig::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_encode_parse_line() {
        let line = "2025-03-18T07:59:57.123456Z,ETH/USD,1850.5,1943.025,1813.49,N/A";
        let event = parse_line(line).unwrap();
        assert_eq!(event.symbol, "ETH/USD");
        assert_eq!(event.entry_price, dec!(1850.5));
        assert!(event.is_pending());
        assert_eq!(encode_line(&event).unwrap(), line);

        let resolved = parse_line("2025-03-18T07:59:57Z,ETH/USD,1850.5,1943.025,1813.49,1861.2").unwrap();
        assert_eq!(resolved.outcome, Outcome::Resolved(dec!(1861.2)));
    }

    #[test]
    fn test_parse_legacy_timestamp() {
        let event = parse_line("2025-03-18 07:59:57.123456+00:00,XBT/USD,100,105.0,98.0,N/A").unwrap();
        assert_eq!(event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true), "2025-03-18T07:59:57.123456Z");
    }

    #[test]
    fn test_parse_line_errors() {
        assert_eq!(parse_line("a,b,c").unwrap_err(), LineError::FieldCount(3));
        assert_eq!(
            parse_line("2025-03-18T07:59:57Z,ETH/USD,1,2,3,N/A,extra").unwrap_err(),
            LineError::FieldCount(7)
        );
        assert!(matches!(
            parse_line("yesterday,ETH/USD,1,2,3,N/A").unwrap_err(),
            LineError::Timestamp(_)
        ));
        assert!(matches!(
            parse_line("2025-03-18T07:59:57Z,ETH/USD,abc,2,3,N/A").unwrap_err(),
            LineError::Number { field: "entry_price", .. }
        ));
        assert_eq!(
            parse_line("2025-03-18T07:59:57Z,,1,2,3,N/A").unwrap_err(),
            LineError::EmptySymbol
        );
    }

    #[test]
    fn test_append_computes_target_and_stop() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        let AppendOutcome::Appended(event) = store.append_if_new("ETH/USD", dec!(1850.5)).unwrap() else {
            panic!("expected append");
        };
        assert_eq!(event.target_price, dec!(1943.025));
        assert_eq!(event.stop_loss, dec!(1813.49));
        assert!(event.is_pending());

        let lines = read_lines(&cfg.path);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(",ETH/USD,1850.5,1943.025,1813.49,N/A"));
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_target_rounds_to_six_places() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        let AppendOutcome::Appended(event) = store.append_if_new("SHIB/USD", dec!(0.0000123457)).unwrap() else {
            panic!("expected append");
        };
        assert_eq!(event.target_price, dec!(0.000013));
        assert_eq!(event.stop_loss, dec!(0.000012));
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_duplicate_while_pending() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        assert!(matches!(store.append_if_new("BTC/USD", dec!(100)).unwrap(), AppendOutcome::Appended(_)));
        assert_eq!(store.append_if_new("BTC/USD", dec!(105)).unwrap(), AppendOutcome::Duplicate);
        assert_eq!(read_lines(&cfg.path).len(), 1);

        // Other symbols are unaffected
        assert!(matches!(store.append_if_new("ETH/USD", dec!(10)).unwrap(), AppendOutcome::Appended(_)));
        assert_eq!(read_lines(&cfg.path).len(), 2);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_append_allowed_after_resolve() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        store.append_if_new("BTC/USD", dec!(100)).unwrap();
        assert!(store.resolve_pending("BTC/USD", dec!(101)).unwrap());
        assert!(matches!(store.append_if_new("BTC/USD", dec!(105)).unwrap(), AppendOutcome::Appended(_)));
        assert_eq!(read_lines(&cfg.path).len(), 2);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_dedup_window_is_bounded() {
        let cfg = LedgerConfig {
            dedup_window: 3,
            ..temp_config()
        };
        let mut store = LedgerStore::open(&cfg).unwrap();
        store.append_if_new("OLD/USD", dec!(1)).unwrap();
        for sym in ["A/USD", "B/USD", "C/USD"] {
            store.append_if_new(sym, dec!(1)).unwrap();
        }
        // The pending OLD/USD row has scrolled out of the window.
        assert!(matches!(store.append_if_new("OLD/USD", dec!(2)).unwrap(), AppendOutcome::Appended(_)));
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_resolve_changes_one_field_of_one_row() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        store.append_if_new("BTC/USD", dec!(100)).unwrap();
        store.append_if_new("ETH/USD", dec!(10)).unwrap();
        store.append_if_new("SOL/USD", dec!(20)).unwrap();
        let before = read_lines(&cfg.path);

        assert!(store.resolve_pending("ETH/USD", dec!(10.4)).unwrap());
        let after = read_lines(&cfg.path);

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0], after[0]);
        assert_eq!(before[2], after[2]);
        let old: Vec<&str> = before[1].split(',').collect();
        let new: Vec<&str> = after[1].split(',').collect();
        assert_eq!(old[..5], new[..5]);
        assert_eq!(old[5], "N/A");
        assert_eq!(new[5], "10.4");
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_resolve_without_pending_is_noop() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        store.append_if_new("BTC/USD", dec!(100)).unwrap();
        let before = fs::read_to_string(&cfg.path).unwrap();

        assert!(!store.resolve_pending("ETH/USD", dec!(1)).unwrap());
        assert!(store.resolve_pending("BTC/USD", dec!(99)).unwrap());
        let resolved = fs::read_to_string(&cfg.path).unwrap();
        assert_ne!(before, resolved);
        assert!(!store.resolve_pending("BTC/USD", dec!(98)).unwrap());
        assert_eq!(fs::read_to_string(&cfg.path).unwrap(), resolved);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_resolve_picks_newest_pending() {
        let cfg = temp_config();
        fs::write(
            &cfg.path,
            "2025-03-18T07:00:00Z,BTC/USD,100,105,98,N/A\n\
             2025-03-18T08:00:00Z,BTC/USD,110,115.5,107.8,N/A\n",
        )
        .unwrap();
        let mut store = LedgerStore::open(&cfg).unwrap();
        assert!(store.resolve_pending("BTC/USD", dec!(111)).unwrap());
        let lines = read_lines(&cfg.path);
        assert!(lines[0].ends_with(",N/A"));
        assert!(lines[1].ends_with(",111"));
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_resolve_event_targets_its_own_row() {
        let cfg = LedgerConfig {
            dedup_window: 1,
            ..temp_config()
        };
        let mut store = LedgerStore::open(&cfg).unwrap();
        let AppendOutcome::Appended(first) = store.append_if_new("ETH/USD", dec!(100)).unwrap() else {
            panic!("expected append");
        };
        store.append_if_new("SOL/USD", dec!(20)).unwrap();
        let AppendOutcome::Appended(second) = store.append_if_new("ETH/USD", dec!(150)).unwrap() else {
            panic!("expected append");
        };

        assert!(store.resolve_event("ETH/USD", first.timestamp, dec!(200)).unwrap());
        let lines = read_lines(&cfg.path);
        assert!(lines[0].ends_with(",ETH/USD,100,105,98,200"));
        assert!(lines[2].ends_with(",ETH/USD,150,157.5,147,N/A"));

        // Already resolved, and unknown timestamps, leave the file alone.
        assert!(!store.resolve_event("ETH/USD", first.timestamp, dec!(201)).unwrap());
        assert!(!store.resolve_event("SOL/USD", second.timestamp, dec!(21)).unwrap());
        assert_eq!(read_lines(&cfg.path), lines);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_failed_append_leaves_store_unchanged() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("breakwatch_test_dir_{}", uuid::Uuid::new_v4()));
        fs::create_dir(&dir).unwrap();
        let cfg = LedgerConfig {
            path: dir.join("ledger.csv"),
            ..LedgerConfig::default()
        };
        let mut store = LedgerStore::open(&cfg).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(
            store.append_if_new("ETH/USD", dec!(10)),
            Err(LedgerError::Persist { ref symbol, .. }) if symbol == "ETH/USD"
        ));
        assert_eq!(store.events().count(), 0);

        // The failed event is not pending, so the retry is a fresh append on a clean line.
        fs::create_dir(&dir).unwrap();
        assert!(matches!(store.append_if_new("ETH/USD", dec!(10)).unwrap(), AppendOutcome::Appended(_)));
        let lines = read_lines(&cfg.path);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(",ETH/USD,10,10.5,9.8,N/A"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_malformed_lines_skipped_and_preserved() {
        let cfg = temp_config();
        fs::write(
            &cfg.path,
            "timestamp,symbol,price\n\
             2025-03-18T07:00:00Z,BTC/USD,100,105,98,N/A\n\
             \n\
             garbage line",
        )
        .unwrap();
        let mut store = LedgerStore::open(&cfg).unwrap();
        assert_eq!(store.events().count(), 1);

        // Missing trailing newline must not glue the next append onto the garbage.
        store.append_if_new("ETH/USD", dec!(10)).unwrap();
        assert!(store.resolve_pending("BTC/USD", dec!(101)).unwrap());

        let lines = read_lines(&cfg.path);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "timestamp,symbol,price");
        assert!(lines[1].ends_with(",101"));
        assert_eq!(lines[2], "garbage line");
        assert!(lines[3].contains(",ETH/USD,"));

        let reopened = LedgerStore::open(&cfg).unwrap();
        assert_eq!(reopened.events().count(), 2);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_reopen_restores_state() {
        let cfg = temp_config();
        {
            let mut store = LedgerStore::open(&cfg).unwrap();
            store.append_if_new("BTC/USD", dec!(100)).unwrap();
        }
        let mut store = LedgerStore::open(&cfg).unwrap();
        assert_eq!(store.recent(10).len(), 1);
        // Pending state survives a restart, so dedup still applies.
        assert_eq!(store.append_if_new("BTC/USD", dec!(101)).unwrap(), AppendOutcome::Duplicate);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_recent_is_oldest_first() {
        let cfg = temp_config();
        let mut store = LedgerStore::open(&cfg).unwrap();
        for sym in ["A/USD", "B/USD", "C/USD"] {
            store.append_if_new(sym, dec!(1)).unwrap();
        }
        let recent: Vec<String> = store.recent(2).into_iter().map(|e| e.symbol).collect();
        assert_eq!(recent, vec!["B/USD", "C/USD"]);
        fs::remove_file(&cfg.path).unwrap();
    }

    #[test]
    fn test_open_unwritable_path_fails() {
        let cfg = LedgerConfig {
            path: PathBuf::from("/nonexistent-dir-breakwatch/ledger.csv"),
            ..LedgerConfig::default()
        };
        assert!(matches!(LedgerStore::open(&cfg), Err(LedgerError::Open { .. })));
    }
}
