//! Post-hoc KPI computation from fleet simulation records.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::shedder::ShedAction;
use super::types::CycleRecord;

/// Aggregate key performance indicators derived from a complete run.
///
/// Computed post-hoc from `Vec<CycleRecord>` so reported metrics always
/// match the per-cycle data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetKpis {
    /// Number of node-cycle records.
    pub node_cycles: usize,
    /// Energy actually drawn by the whole fleet (kWh).
    pub total_consumption_kwh: f32,
    /// Monthly cap in effect at the end of the run (kWh).
    pub cap_kwh: f32,
    /// `total_consumption / cap`, in percent.
    pub utilisation_pct: f32,
    /// Worst final-cycle projection beyond the remaining budget (kWh, >= 0).
    pub projected_overrun_kwh: f32,
    /// Node-cycles spent switched off.
    pub off_cycles: usize,
    /// Node-cycles spent dimmed.
    pub dim_cycles: usize,
    /// Mean number of peers known at decision time.
    pub mean_peers_known: f32,
    /// Commands re-broadcast by the fleet.
    pub relayed_commands: u64,
}

impl FleetKpis {
    /// Computes all KPIs from the complete record vector.
    ///
    /// # Arguments
    ///
    /// * `records` - Every node's cycle records
    /// * `relayed_commands` - Relay count reported by the nodes
    pub fn from_records(records: &[CycleRecord], relayed_commands: u64) -> Self {
        if records.is_empty() {
            return Self {
                relayed_commands,
                ..Self::default()
            };
        }

        let mut total = 0.0_f32;
        let mut off = 0_usize;
        let mut dim = 0_usize;
        let mut peers = 0_usize;
        let mut last_per_node: BTreeMap<_, &CycleRecord> = BTreeMap::new();

        for r in records {
            total += r.interval_kwh;
            match r.action {
                ShedAction::Off => off += 1,
                ShedAction::Dim(_) => dim += 1,
                ShedAction::On => {}
            }
            peers += r.peers_known;
            let slot = last_per_node.entry(r.node).or_insert(r);
            if r.cycle >= slot.cycle {
                *slot = r;
            }
        }

        let cap = last_per_node
            .values()
            .map(|r| r.cap_kwh)
            .fold(0.0_f32, f32::max);
        let overrun = last_per_node
            .values()
            .map(|r| (r.aggregate_forecast_kwh - r.budget_remaining_kwh).max(0.0))
            .fold(0.0_f32, f32::max);

        Self {
            node_cycles: records.len(),
            total_consumption_kwh: total,
            cap_kwh: cap,
            utilisation_pct: if cap > 0.0 { 100.0 * total / cap } else { 0.0 },
            projected_overrun_kwh: overrun,
            off_cycles: off,
            dim_cycles: dim,
            mean_peers_known: peers as f32 / records.len() as f32,
            relayed_commands,
        }
    }
}

impl fmt::Display for FleetKpis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Node-cycles:           {}", self.node_cycles)?;
        writeln!(
            f,
            "Fleet consumption:     {:.2} kWh of {:.2} kWh ({:.1}%)",
            self.total_consumption_kwh, self.cap_kwh, self.utilisation_pct
        )?;
        writeln!(f, "Projected overrun:     {:.2} kWh", self.projected_overrun_kwh)?;
        writeln!(
            f,
            "Shed node-cycles:      {} off, {} dimmed",
            self.off_cycles, self.dim_cycles
        )?;
        writeln!(f, "Mean peer view:        {:.2}", self.mean_peers_known)?;
        write!(f, "Relayed commands:      {}", self.relayed_commands)
    }
}
