//! REST API for a finished simulation run.
//!
//! Provides two GET endpoints:
//! - `/state`: scenario, KPI report, and the latest record of every outlet
//! - `/telemetry`: cycle records with optional cycle-range and outlet filtering

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::sim::kpi::FleetKpis;
use crate::sim::types::CycleRecord;

/// Immutable application state shared across all request handlers.
///
/// Constructed once after the simulation run completes and wrapped in
/// `Arc`; no locks needed since all data is read-only.
pub struct AppState {
    /// Scenario used for this run.
    pub config: ScenarioConfig,
    /// Aggregate KPI report.
    pub kpis: FleetKpis,
    /// Per-node, per-cycle records.
    pub records: Vec<CycleRecord>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/telemetry", get(handlers::get_telemetry))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
