//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use outlet_shed::config::ScenarioConfig;
use outlet_shed::devices::{Outlet, SyntheticProbe};
use outlet_shed::net::snapshot::NodeId;
use outlet_shed::sim::node::{NodeSettings, OutletNode};
use outlet_shed::sim::schedule::{PrioritySchedule, ShedPermission};
use outlet_shed::sim::sync::SyncConfig;

/// Wall-clock instant on the given day.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid test timestamp")
}

/// Baseline four-outlet fleet limited to `cycles` cycles.
pub fn small_config(cycles: u64) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.cycles = cycles;
    cfg
}

/// Settings for a stand-alone outlet at uniform priority `priority`.
pub fn node_settings(id: u16, priority: i32, cap_kwh: f32) -> NodeSettings {
    NodeSettings {
        id: NodeId(id),
        cycle: TimeDelta::hours(6),
        history_slots: 28,
        monthly_cap_kwh: cap_kwh,
        schedule: PrioritySchedule::uniform(priority).expect("valid priority"),
        permissions: ShedPermission::default(),
        sync: SyncConfig::default(),
        stale_after_cycles: 4,
    }
}

/// Outlet drawing a constant `kw`, created at `now`.
pub fn constant_node(
    id: u16,
    kw: f32,
    cap_kwh: f32,
    now: NaiveDateTime,
) -> OutletNode<Outlet, SyntheticProbe> {
    OutletNode::new(
        node_settings(id, 2, cap_kwh),
        Outlet::new(NodeId(id), true),
        SyntheticProbe::new(kw, 0.0, 0.0, 0.0, u64::from(id)),
        now,
    )
}
