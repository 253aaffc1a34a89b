//! Per-node, per-cycle records produced by the control loop.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::shedder::{ShedAction, ShedReason};
use crate::net::snapshot::NodeId;

/// Complete record of one outlet's sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    /// Outlet that produced the record.
    pub node: NodeId,
    /// Cycle index since the node started.
    pub cycle: u64,
    /// Wall time at the cycle boundary.
    pub time: NaiveDateTime,
    /// Priority in effect for the quarter.
    pub priority: i32,
    /// Whether the outlet was sheddable in the quarter.
    pub can_shed: bool,
    /// Energy drawn by this outlet during the interval that just ended (kWh).
    pub interval_kwh: f32,
    /// Own forecast to month end (kWh).
    pub self_forecast_kwh: f32,
    /// Own forecast plus every known peer forecast (kWh).
    pub aggregate_forecast_kwh: f32,
    /// Fleet consumption this month, as seen by this outlet (kWh).
    pub consumed_kwh: f32,
    /// Monthly cap at decision time (kWh).
    pub cap_kwh: f32,
    /// `cap - consumed`, floored at zero (kWh).
    pub budget_remaining_kwh: f32,
    /// Cycles left in the month, counting this one.
    pub remaining_cycles: u32,
    /// Peers in the table at decision time.
    pub peers_known: usize,
    /// Snapshots received during the sync window.
    pub snapshots_received: u32,
    /// Deficit after lower tiers are shed (kWh).
    pub deficit_kwh: f32,
    pub action: ShedAction,
    pub reason: ShedReason,
    /// Output fraction applied to the actuator, in `[0, 1]`.
    pub output_level: f32,
}

impl fmt::Display for CycleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} c={:>3} {} | prio={} shed_ok={:<5} | used={:>7.2} kWh  own={:>8.2}  \
             agg={:>9.2}  left={:>9.2} ({:>3} cycles) | peers={:>2} | {:<9} {:?}",
            self.node,
            self.cycle,
            self.time.format("%Y-%m-%d %H:%M"),
            self.priority,
            self.can_shed,
            self.interval_kwh,
            self.self_forecast_kwh,
            self.aggregate_forecast_kwh,
            self.budget_remaining_kwh,
            self.remaining_cycles,
            self.peers_known,
            self.action.to_string(),
            self.reason,
        )
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    /// A plausible record for formatter and aggregation tests.
    pub fn record(node: u16, cycle: u64, action: ShedAction) -> CycleRecord {
        let start = NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid start");
        CycleRecord {
            node: NodeId(node),
            cycle,
            time: start + TimeDelta::hours(6 * cycle as i64),
            priority: 2,
            can_shed: true,
            interval_kwh: 1.5,
            self_forecast_kwh: 120.0,
            aggregate_forecast_kwh: 300.0,
            consumed_kwh: 10.0 * cycle as f32,
            cap_kwh: 400.0,
            budget_remaining_kwh: 400.0 - 10.0 * cycle as f32,
            remaining_cycles: 124 - cycle as u32,
            peers_known: 2,
            snapshots_received: 20,
            deficit_kwh: 300.0,
            action,
            reason: ShedReason::LowerTiersSuffice,
            output_level: action.level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn display_mentions_node_and_action() {
        let line = record(4, 3, ShedAction::Dim(0.5)).to_string();
        assert!(line.starts_with("outlet-4"));
        assert!(line.contains("dim(50%)"));
        assert!(line.contains("2026-05-01 18:00"));
    }
}
