//! Request handlers for the API endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, StateResponse, TelemetryQuery, TelemetryRecord};
use crate::sim::types::CycleRecord;

/// Returns the scenario, KPI report, and each outlet's latest record.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let mut latest: BTreeMap<u16, &CycleRecord> = BTreeMap::new();
    for r in &state.records {
        latest
            .entry(r.node.0)
            .and_modify(|prev| {
                if r.cycle >= prev.cycle {
                    *prev = r;
                }
            })
            .or_insert(r);
    }

    Json(StateResponse {
        config: state.config.clone(),
        kpis: state.kpis.clone(),
        latest: latest.into_values().map(TelemetryRecord::from).collect(),
    })
}

/// Returns cycle records, optionally filtered by cycle range and outlet.
///
/// `GET /telemetry` → 200 + `Vec<TelemetryRecord>` JSON
/// `GET /telemetry?from=N&to=M&node=K` → filtered (range inclusive)
/// `GET /telemetry?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(u64::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let records: Vec<TelemetryRecord> = state
        .records
        .iter()
        .filter(|r| r.cycle >= from && r.cycle <= to)
        .filter(|r| query.node.is_none_or(|n| r.node.0 == n))
        .map(TelemetryRecord::from)
        .collect();

    Ok(Json(records))
}
