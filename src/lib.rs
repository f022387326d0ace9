//! breakwatch — multi-timeframe breakout confirmation and outcome tracking
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod indicators;
pub mod feed;
pub mod ledger;
pub mod engine;
pub mod notify;
pub mod dashboard;
