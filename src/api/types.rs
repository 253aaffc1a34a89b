//! API response and query types.
//!
//! Telemetry field names match the CSV export columns.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::ScenarioConfig;
use crate::sim::kpi::FleetKpis;
use crate::sim::shedder::{ShedAction, ShedReason};
use crate::sim::types::CycleRecord;

/// Combined state response: scenario, KPIs, and the latest record per outlet.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub config: ScenarioConfig,
    pub kpis: FleetKpis,
    /// Most recent record of each outlet, ordered by outlet id.
    pub latest: Vec<TelemetryRecord>,
}

/// Single telemetry record.
#[derive(Debug, Serialize)]
pub struct TelemetryRecord {
    pub node: u16,
    pub cycle: u64,
    pub time: NaiveDateTime,
    pub priority: i32,
    pub can_shed: bool,
    pub interval_kwh: f32,
    pub self_forecast_kwh: f32,
    pub aggregate_forecast_kwh: f32,
    pub consumed_kwh: f32,
    pub cap_kwh: f32,
    pub budget_remaining_kwh: f32,
    pub remaining_cycles: u32,
    pub peers_known: usize,
    #[serde(flatten)]
    pub action: ShedAction,
    pub output_level: f32,
    pub reason: ShedReason,
}

impl From<&CycleRecord> for TelemetryRecord {
    fn from(r: &CycleRecord) -> Self {
        Self {
            node: r.node.0,
            cycle: r.cycle,
            time: r.time,
            priority: r.priority,
            can_shed: r.can_shed,
            interval_kwh: r.interval_kwh,
            self_forecast_kwh: r.self_forecast_kwh,
            aggregate_forecast_kwh: r.aggregate_forecast_kwh,
            consumed_kwh: r.consumed_kwh,
            cap_kwh: r.cap_kwh,
            budget_remaining_kwh: r.budget_remaining_kwh,
            remaining_cycles: r.remaining_cycles,
            peers_known: r.peers_known,
            action: r.action,
            output_level: r.output_level,
            reason: r.reason,
        }
    }
}

/// Optional filters for the telemetry endpoint.
#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    /// First cycle (inclusive).
    pub from: Option<u64>,
    /// Last cycle (inclusive).
    pub to: Option<u64>,
    /// Restrict to one outlet.
    pub node: Option<u16>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
