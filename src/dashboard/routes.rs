//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::scanner::CycleReport;
use crate::engine::tracker::TrackingStats;
use crate::ledger::summary::LedgerSummary;
use crate::ledger::EventLedger;
use crate::types::Event;

/// Events returned when `limit` is not given.
const DEFAULT_EVENT_LIMIT: usize = 10;
const MAX_EVENT_LIMIT: usize = 1_000;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub ledger: EventLedger,
    pub started_at: DateTime<Utc>,
    /// Written by the scan loop after every cycle.
    pub last_cycle: RwLock<Option<CycleReport>>,
    /// Written by the tracking report consumer.
    pub tracking: RwLock<TrackingStats>,
}

impl DashboardState {
    pub fn new(ledger: EventLedger) -> Self {
        Self {
            ledger,
            started_at: Utc::now(),
            last_cycle: RwLock::new(None),
            tracking: RwLock::new(TrackingStats::default()),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingResponse {
    pub uptime_secs: i64,
    #[serde(flatten)]
    pub stats: TrackingStats,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/events?limit=N — newest N events, oldest first.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    state.ledger.recent(limit).await.map(Json).map_err(|e| {
        warn!(error = %e, "Ledger unavailable for /api/events");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

/// GET /api/summary
pub async fn get_summary(State(state): State<AppState>) -> Result<Json<LedgerSummary>, StatusCode> {
    state.ledger.summary().await.map(Json).map_err(|e| {
        warn!(error = %e, "Ledger unavailable for /api/summary");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

/// GET /api/cycle — `null` until the first cycle finishes.
pub async fn get_cycle(State(state): State<AppState>) -> Json<Option<CycleReport>> {
    Json(state.last_cycle.read().await.clone())
}

/// GET /api/tracking
pub async fn get_tracking(State(state): State<AppState>) -> Json<TrackingResponse> {
    Json(TrackingResponse {
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        stats: state.tracking.read().await.clone(),
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
