//! Integration tests: the full confirm → record → track pipeline against
//! an in-memory feed and a temporary ledger file.

mod mock_feed;
mod scenarios;
