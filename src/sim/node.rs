//! One outlet's control logic, independent of how time and I/O are driven.
//!
//! [`OutletNode`] owns every per-node component (forecaster, peer table,
//! budget, schedules, sync engine, shedder, actuator, probe) and exposes the
//! cycle as a few explicit steps. The live [`ControlLoop`](super::control::ControlLoop)
//! and the simulated [`FleetEngine`](super::engine::FleetEngine) both call
//! these steps; they only differ in how they wait.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};

use super::budget::BudgetState;
use super::clock::ClockSource;
use super::peers::PeerTable;
use super::schedule::{PrioritySchedule, ShedPermission};
use super::shedder::{LoadShedder, ShedAction, ShedInput};
use super::sync::{SyncConfig, SyncEngine, SyncPhase};
use super::types::CycleRecord;
use crate::devices::{Actuator, ConsumptionProbe};
use crate::forecast::HistoryForecaster;
use crate::net::command::{Command, CommandKind, CommandOrigin};
use crate::net::snapshot::{NodeId, Snapshot};
use crate::net::transport::Transport;

/// Where the node is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Sleeping,
    Sampling,
    Forecasting,
    Synchronizing,
    Deciding,
    ConfigApplying,
}

/// Static parameters of one outlet.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub id: NodeId,
    pub cycle: TimeDelta,
    pub history_slots: usize,
    pub monthly_cap_kwh: f32,
    pub schedule: PrioritySchedule,
    pub permissions: ShedPermission,
    pub sync: SyncConfig,
    /// Cycles of silence after which a peer is forgotten; 0 keeps peers forever.
    pub stale_after_cycles: u64,
}

/// Running totals kept for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStats {
    pub applied: u64,
    pub rejected: u64,
    pub relayed: u64,
}

pub struct OutletNode<A, P> {
    id: NodeId,
    actuator: A,
    probe: P,
    forecaster: HistoryForecaster,
    peers: PeerTable,
    budget: BudgetState,
    schedule: PrioritySchedule,
    permissions: ShedPermission,
    sync: SyncEngine,
    shedder: LoadShedder,
    stale_after: u64,
    phase: LoopPhase,
    cycle: u64,
    last_sample_at: NaiveDateTime,
    interval_kwh: f32,
    powered_in_interval: bool,
    last_interval_kwh: f32,
    self_forecast_kwh: f32,
    outgoing: Snapshot,
    cycle_started_at: NaiveDateTime,
    commands: CommandStats,
}

impl<A: Actuator, P: ConsumptionProbe> OutletNode<A, P> {
    /// Creates a node whose billing period contains `now`.
    pub fn new(settings: NodeSettings, actuator: A, probe: P, now: NaiveDateTime) -> Self {
        let mut node = Self {
            id: settings.id,
            actuator,
            probe,
            forecaster: HistoryForecaster::new(settings.history_slots),
            peers: PeerTable::new(settings.id),
            budget: BudgetState::new(settings.monthly_cap_kwh, now, settings.cycle),
            schedule: settings.schedule,
            permissions: settings.permissions,
            sync: SyncEngine::new(settings.sync),
            shedder: LoadShedder,
            stale_after: settings.stale_after_cycles,
            phase: LoopPhase::Sleeping,
            cycle: 0,
            last_sample_at: now,
            interval_kwh: 0.0,
            powered_in_interval: false,
            last_interval_kwh: 0.0,
            self_forecast_kwh: 0.0,
            outgoing: Snapshot::sentinel(),
            cycle_started_at: now,
            commands: CommandStats::default(),
        };
        node.outgoing = node.snapshot_at(now);
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn budget(&self) -> &BudgetState {
        &self.budget
    }

    pub fn schedule(&self) -> &PrioritySchedule {
        &self.schedule
    }

    pub fn permissions(&self) -> &ShedPermission {
        &self.permissions
    }

    pub fn forecaster(&self) -> &HistoryForecaster {
        &self.forecaster
    }

    pub fn command_stats(&self) -> CommandStats {
        self.commands
    }

    pub fn sync_config(&self) -> &SyncConfig {
        self.sync.config()
    }

    /// Energy accumulated since the last cycle boundary (kWh).
    pub fn pending_interval_kwh(&self) -> f32 {
        self.interval_kwh
    }

    /// Reads the probe for the time elapsed since the previous sample.
    pub fn sample(&mut self, now: NaiveDateTime) {
        let previous = self.phase;
        self.phase = LoopPhase::Sampling;
        let hours = (now - self.last_sample_at).num_milliseconds() as f32 / 3_600_000.0;
        let level = self.actuator.output_level();
        if hours > 0.0 {
            self.interval_kwh += self.probe.sample(now, hours, level);
            if level > 0.0 {
                self.powered_in_interval = true;
            }
        }
        self.last_sample_at = now;
        self.phase = previous;
    }

    /// Parses and applies one operator command line.
    ///
    /// Commands that fail to parse are logged and dropped. A command that
    /// arrived locally and is not meant for this outlet alone is relayed
    /// once, piggy-backed on the current snapshot.
    pub fn handle_command_line<C, T>(
        &mut self,
        line: &str,
        origin: CommandOrigin,
        clock: &mut C,
        transport: &mut T,
    ) where
        C: ClockSource + ?Sized,
        T: Transport + ?Sized,
    {
        let previous = self.phase;
        self.phase = LoopPhase::ConfigApplying;

        match line.parse::<Command>() {
            Ok(command) => {
                if command.should_relay(origin, self.id) {
                    let relay = self.snapshot_at(clock.now()).with_command(command.line.clone());
                    match relay.encode() {
                        Ok(_) => {
                            transport.broadcast(&relay);
                            self.commands.relayed += 1;
                            info!(node = %self.id, command = %command, "relaying command");
                        }
                        Err(err) => warn!(node = %self.id, command = %command, %err, "command not relayed"),
                    }
                }
                if command.addresses(self.id) {
                    self.apply(command, clock);
                }
            }
            Err(err) => {
                self.commands.rejected += 1;
                warn!(node = %self.id, ?origin, line, %err, "rejected command");
            }
        }

        self.phase = previous;
    }

    fn apply<C: ClockSource + ?Sized>(&mut self, command: Command, clock: &mut C) {
        match command.kind {
            CommandKind::SetPriority { quarter, priority } => {
                if let Err(err) = self.schedule.set(quarter, priority) {
                    self.commands.rejected += 1;
                    warn!(node = %self.id, %err, "priority not applied");
                    return;
                }
            }
            CommandKind::SetShedPermission { quarter, allowed } => {
                self.permissions.set(quarter, allowed);
            }
            CommandKind::SetClock(wall) => {
                clock.set(wall);
                self.budget.resync(wall);
                self.last_sample_at = wall;
            }
            CommandKind::SetBudget(kwh) => self.budget.set_cap(kwh),
        }
        self.commands.applied += 1;
        info!(node = %self.id, command = %command.line, "applied command");
    }

    /// Handles everything waiting on the transport outside a sync window.
    pub fn drain_transport<C, T>(&mut self, clock: &mut C, transport: &mut T)
    where
        C: ClockSource + ?Sized,
        T: Transport + ?Sized,
    {
        while let Some(snapshot) = transport.try_receive() {
            if snapshot.is_sentinel() {
                continue;
            }
            if let Some(line) = &snapshot.command {
                self.handle_command_line(line, CommandOrigin::Gossip, clock, transport);
            }
            self.peers.upsert(&snapshot, self.cycle);
        }
    }

    /// Closes the previous interval and prepares the outgoing snapshot.
    ///
    /// Handles month rollover, feeds the forecaster, evicts silent peers and
    /// opens the sync window at monotonic instant `mono`.
    pub fn begin_cycle(&mut self, now: NaiveDateTime, mono: Duration) -> &Snapshot {
        if self.budget.needs_rollover(now) {
            self.budget.rollover(now);
        }
        self.cycle_started_at = now;

        self.sample(now);
        self.phase = LoopPhase::Forecasting;
        self.last_interval_kwh = self.interval_kwh;
        self.forecaster
            .record(self.interval_kwh, self.powered_in_interval);
        self.interval_kwh = 0.0;
        self.powered_in_interval = false;
        self.self_forecast_kwh = self
            .forecaster
            .forecast_to_month_end(self.budget.remaining_cycles());

        let evicted = self.peers.evict_stale(self.cycle, self.stale_after);
        if evicted > 0 {
            debug!(node = %self.id, evicted, "silent peers dropped");
        }

        self.outgoing = self.snapshot_at(now);
        self.phase = LoopPhase::Synchronizing;
        self.sync.begin(mono);
        &self.outgoing
    }

    /// Advances the sync window by one step and applies gossiped commands.
    pub fn poll_sync<C, T>(&mut self, clock: &mut C, transport: &mut T) -> SyncPhase
    where
        C: ClockSource + ?Sized,
        T: Transport + ?Sized,
    {
        let phase = self.sync.poll(
            clock.monotonic(),
            transport,
            &self.outgoing,
            &mut self.peers,
            self.cycle,
        );
        for line in self.sync.take_commands() {
            self.handle_command_line(&line, CommandOrigin::Gossip, clock, transport);
        }
        phase
    }

    /// Aggregates, decides and actuates. Ends the cycle.
    pub fn finish_cycle(&mut self) -> CycleRecord {
        self.phase = LoopPhase::Deciding;
        let at = self.cycle_started_at;

        self.budget
            .record_consumption(self.last_interval_kwh + self.peers.last_interval_total(self.cycle));
        let aggregate = self.peers.aggregate_forecast(self.self_forecast_kwh);
        let priority = self.schedule.priority_at(at);
        let can_shed = self.permissions.allowed_at(at);

        let decision = self.shedder.decide(&ShedInput {
            self_forecast_kwh: self.self_forecast_kwh,
            aggregate_forecast_kwh: aggregate,
            budget_remaining_kwh: self.budget.remaining_kwh(),
            priority,
            can_shed_now: can_shed,
            dimmable: self.actuator.dimmable(),
            peers: &self.peers,
        });

        let before = self.actuator.output_level();
        self.actuate(decision.action);
        let after = self.actuator.output_level();
        if before != after {
            info!(
                node = %self.id,
                cycle = self.cycle,
                action = %decision.action,
                reason = ?decision.reason,
                deficit_kwh = decision.deficit_kwh,
                budget_kwh = self.budget.remaining_kwh(),
                "output changed"
            );
        }
        debug!(
            node = %self.id,
            cycle = self.cycle,
            own_kwh = self.self_forecast_kwh,
            aggregate_kwh = aggregate,
            consumed_kwh = self.budget.consumed_kwh(),
            peers = self.peers.len(),
            "cycle decided"
        );

        let record = CycleRecord {
            node: self.id,
            cycle: self.cycle,
            time: at,
            priority,
            can_shed,
            interval_kwh: self.last_interval_kwh,
            self_forecast_kwh: self.self_forecast_kwh,
            aggregate_forecast_kwh: aggregate,
            consumed_kwh: self.budget.consumed_kwh(),
            cap_kwh: self.budget.cap_kwh(),
            budget_remaining_kwh: self.budget.remaining_kwh(),
            remaining_cycles: self.budget.remaining_cycles(),
            peers_known: self.peers.len(),
            snapshots_received: self.sync.report().received,
            deficit_kwh: decision.deficit_kwh,
            action: decision.action,
            reason: decision.reason,
            output_level: after,
        };

        self.budget.complete_cycle();
        self.cycle += 1;
        self.phase = LoopPhase::Sleeping;
        record
    }

    fn actuate(&mut self, action: ShedAction) {
        match action {
            ShedAction::On => {
                self.actuator.set_dim_level(1.0);
                self.actuator.turn_on();
            }
            ShedAction::Off => self.actuator.turn_off(),
            ShedAction::Dim(level) => {
                self.actuator.set_dim_level(level);
                self.actuator.turn_on();
            }
        }
    }

    fn snapshot_at(&self, now: NaiveDateTime) -> Snapshot {
        Snapshot {
            sender: self.id,
            forecast_kwh: self.self_forecast_kwh.max(0.0),
            last_interval_kwh: self.last_interval_kwh.max(0.0),
            priority: self.schedule.priority_at(now),
            can_shed: self.permissions.allowed_at(now),
            command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Outlet, SyntheticProbe};
    use crate::net::medium::SharedMedium;
    use crate::sim::clock::SimClock;
    use crate::sim::schedule::Quarter;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid start")
    }

    fn settings(id: u16) -> NodeSettings {
        NodeSettings {
            id: NodeId(id),
            cycle: TimeDelta::hours(6),
            history_slots: 28,
            monthly_cap_kwh: 1000.0,
            schedule: PrioritySchedule::uniform(5).expect("valid priority"),
            permissions: ShedPermission::default(),
            sync: SyncConfig::default(),
            stale_after_cycles: 4,
        }
    }

    fn node(id: u16, base_kw: f32) -> OutletNode<Outlet, SyntheticProbe> {
        OutletNode::new(
            settings(id),
            Outlet::new(NodeId(id), true),
            SyntheticProbe::new(base_kw, 0.0, 0.0, 0.0, 1),
            start(),
        )
    }

    #[test]
    fn sampling_accumulates_energy() {
        let mut n = node(1, 2.0);
        n.sample(start() + TimeDelta::hours(1));
        n.sample(start() + TimeDelta::hours(3));
        assert!((n.pending_interval_kwh() - 6.0).abs() < 1e-4);
    }

    #[test]
    fn first_cycle_forecasts_from_recorded_interval() {
        let mut n = node(1, 1.0);
        n.sample(start() + TimeDelta::hours(6));
        let snap = n
            .begin_cycle(start() + TimeDelta::hours(6), Duration::ZERO)
            .clone();
        assert_eq!(snap.sender, NodeId(1));
        assert!((snap.last_interval_kwh - 6.0).abs() < 1e-4);
        // One sample of 6 kWh in a 28-slot window, 120 cycles left in April.
        let expected = 6.0 * HistoryForecaster::weights(28)[27] * 120.0;
        assert!((snap.forecast_kwh - expected).abs() < 1e-2);
        assert_eq!(n.phase(), LoopPhase::Synchronizing);
    }

    #[test]
    fn finish_cycle_keeps_power_within_budget() {
        let mut n = node(1, 1.0);
        n.begin_cycle(start() + TimeDelta::hours(6), Duration::ZERO);
        let record = n.finish_cycle();
        assert_eq!(record.action, ShedAction::On);
        assert_eq!(record.cycle, 0);
        assert_eq!(n.cycle(), 1);
        assert_eq!(n.phase(), LoopPhase::Sleeping);
        assert!((record.consumed_kwh - 6.0).abs() < 1e-4);
    }

    #[test]
    fn over_budget_node_sheds() {
        let mut n = node(1, 10.0);
        let medium = SharedMedium::new(0.0, 1);
        let mut port = medium.attach(NodeId(1));
        let mut clock = SimClock::new(start());
        n.handle_command_line("1 CONSUMO 100", CommandOrigin::Local, &mut clock, &mut port);
        n.begin_cycle(start() + TimeDelta::hours(6), Duration::ZERO);
        let record = n.finish_cycle();
        assert_eq!(record.cap_kwh, 100.0);
        assert_ne!(record.action, ShedAction::On);
        assert!(record.output_level < 1.0);
    }

    #[test]
    fn addressed_local_command_is_applied_not_relayed() {
        let medium = SharedMedium::new(0.0, 1);
        let mut port = medium.attach(NodeId(1));
        let _peer = medium.attach(NodeId(2));
        let mut clock = SimClock::new(start());
        let mut n = node(1, 1.0);

        n.handle_command_line("1 PRIORIDADE 2 7", CommandOrigin::Local, &mut clock, &mut port);
        assert_eq!(n.schedule().priority_in(Quarter::Morning), 7);
        assert_eq!(n.command_stats().relayed, 0);
        assert_eq!(medium.delivered(), 0);
    }

    #[test]
    fn foreign_local_command_is_relayed_only() {
        let medium = SharedMedium::new(0.0, 1);
        let mut port = medium.attach(NodeId(1));
        let mut peer = medium.attach(NodeId(2));
        let mut clock = SimClock::new(start());
        let mut n = node(1, 1.0);

        n.handle_command_line("2 DESLIGAVEL 1 0", CommandOrigin::Local, &mut clock, &mut port);
        assert!(n.permissions().allowed_in(Quarter::Night));
        let relayed = peer.try_receive().expect("relay delivered");
        assert_eq!(relayed.command.as_deref(), Some("2 DESLIGAVEL 1 0"));
    }

    #[test]
    fn clock_command_sets_clock_and_resyncs_budget() {
        let medium = SharedMedium::new(0.0, 1);
        let mut port = medium.attach(NodeId(1));
        let mut clock = SimClock::new(start());
        let mut n = node(1, 1.0);

        n.handle_command_line("1 HORARIO 20260430000000", CommandOrigin::Local, &mut clock, &mut port);
        assert_eq!(clock.now().to_string(), "2026-04-30 00:00:00");
        assert_eq!(n.budget().remaining_cycles(), 4);
    }

    #[test]
    fn malformed_command_is_counted_and_ignored() {
        let medium = SharedMedium::new(0.0, 1);
        let mut port = medium.attach(NodeId(1));
        let mut clock = SimClock::new(start());
        let mut n = node(1, 1.0);

        n.handle_command_line("1 PRIORIDADE 9 3", CommandOrigin::Local, &mut clock, &mut port);
        n.handle_command_line("1 PRIORIDADE 1 0", CommandOrigin::Local, &mut clock, &mut port);
        assert_eq!(n.command_stats().rejected, 2);
        assert_eq!(n.schedule().as_array(), [5; 4]);
    }

    #[test]
    fn month_change_triggers_rollover() {
        let mut n = node(1, 1.0);
        n.begin_cycle(start() + TimeDelta::hours(6), Duration::ZERO);
        n.finish_cycle();
        assert!(n.budget().consumed_kwh() > 0.0);

        let may = NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        n.begin_cycle(may, Duration::ZERO);
        assert_eq!(n.budget().remaining_cycles(), 124);
    }
}
