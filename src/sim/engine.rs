//! Deterministic multi-outlet simulation over one shared medium.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use super::clock::{ClockSource, SimClock};
use super::control::LoopTiming;
use super::node::{CommandStats, OutletNode};
use super::sync::SyncPhase;
use super::types::CycleRecord;
use crate::config::{ConfigError, ScenarioConfig};
use crate::devices::{Outlet, SyntheticProbe};
use crate::net::command::CommandOrigin;
use crate::net::console::{ConfigChannel, ScriptedConsole};
use crate::net::medium::{MediumPort, SharedMedium};
use crate::net::snapshot::NodeId;

/// A simulated outlet together with its private clock, port and console.
struct FleetMember {
    node: OutletNode<Outlet, SyntheticProbe>,
    clock: SimClock,
    port: MediumPort,
    console: ScriptedConsole,
}

impl FleetMember {
    fn poll_io(&mut self) {
        while let Some(line) = self.console.poll_line(self.clock.now()) {
            self.node
                .handle_command_line(&line, CommandOrigin::Local, &mut self.clock, &mut self.port);
        }
        self.node.drain_transport(&mut self.clock, &mut self.port);
        self.node.sample(self.clock.now());
    }
}

/// Simulation engine running every configured outlet in lockstep.
///
/// All members share one monotonic timeline; wall clocks start equal but may
/// diverge when an outlet receives a clock command. Each cycle opens every
/// sync window at the same instant and polls the members round-robin, one
/// receive interval apart, until all windows have drained.
pub struct FleetEngine {
    members: Vec<FleetMember>,
    medium: SharedMedium,
    timing: LoopTiming,
    cycles: u64,
    completed: u64,
    mono: Duration,
    next_deadline: Duration,
}

impl FleetEngine {
    /// Builds the fleet described by `config`.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if `config` is not valid.
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, ConfigError> {
        if let Some(err) = config.validate().into_iter().next() {
            return Err(err);
        }

        let start = config.simulation.start;
        let seed = config.simulation.seed;
        let medium = SharedMedium::new(config.sync.loss_probability, seed);

        let mut members = Vec::with_capacity(config.outlets.len());
        for outlet in &config.outlets {
            let settings = config.node_settings(outlet)?;
            let id = settings.id;
            let node = OutletNode::new(
                settings,
                Outlet::new(id, outlet.dimmable),
                SyntheticProbe::new(
                    outlet.base_kw,
                    outlet.amp_kw,
                    outlet.phase_rad,
                    outlet.noise_std,
                    outlet.seed(seed),
                ),
                start,
            );
            let mut console = ScriptedConsole::new();
            for command in config.commands.iter().filter(|c| c.node == outlet.id) {
                let at = i64::try_from(command.at_minute)
                    .ok()
                    .and_then(TimeDelta::try_minutes)
                    .and_then(|offset| start.checked_add_signed(offset))
                    .unwrap_or(NaiveDateTime::MAX);
                console.push(at, command.line.clone());
            }
            members.push(FleetMember {
                node,
                clock: SimClock::new(start),
                port: medium.attach(id),
                console,
            });
        }

        Ok(Self {
            members,
            medium,
            timing: config.loop_timing(),
            cycles: config.simulation.cycles,
            completed: 0,
            mono: Duration::ZERO,
            next_deadline: Duration::ZERO,
        })
    }

    /// Runs one cycle for every outlet and returns their records, ordered by
    /// configuration order.
    pub fn step(&mut self) -> Vec<CycleRecord> {
        self.idle_until(self.next_deadline);

        for member in &mut self.members {
            let now = member.clock.now();
            member.node.begin_cycle(now, self.mono);
        }

        let tick = self
            .members
            .iter()
            .map(|m| m.node.sync_config().receive_interval())
            .min()
            .unwrap_or(Duration::from_millis(200));
        loop {
            let mut drained = true;
            for member in &mut self.members {
                let phase = member.node.poll_sync(&mut member.clock, &mut member.port);
                drained &= phase == SyncPhase::Drained;
            }
            if drained {
                break;
            }
            self.advance(tick);
        }

        let records: Vec<CycleRecord> = self
            .members
            .iter_mut()
            .map(|m| m.node.finish_cycle())
            .collect();

        debug!(
            cycle = self.completed,
            delivered = self.medium.delivered(),
            dropped = self.medium.dropped(),
            "fleet cycle complete"
        );
        self.completed += 1;
        self.next_deadline += self.timing.cycle;
        records
    }

    /// Executes all configured cycles and returns the complete record vector.
    pub fn run(&mut self) -> Vec<CycleRecord> {
        let remaining = self.cycles.saturating_sub(self.completed);
        let mut records = Vec::with_capacity(remaining as usize * self.members.len());
        for _ in 0..remaining {
            records.extend(self.step());
        }
        info!(
            cycles = self.completed,
            outlets = self.members.len(),
            relayed = self.command_stats().relayed,
            "simulation finished"
        );
        records
    }

    fn idle_until(&mut self, deadline: Duration) {
        loop {
            for member in &mut self.members {
                member.poll_io();
            }
            if self.mono >= deadline {
                return;
            }
            let slice = self.timing.poll.min(deadline - self.mono);
            self.advance(slice);
        }
    }

    fn advance(&mut self, by: Duration) {
        self.mono += by;
        for member in &mut self.members {
            member.clock.advance(by);
        }
    }

    /// Command counters summed over the fleet.
    pub fn command_stats(&self) -> CommandStats {
        self.members
            .iter()
            .map(|m| m.node.command_stats())
            .fold(CommandStats::default(), |acc, s| CommandStats {
                applied: acc.applied + s.applied,
                rejected: acc.rejected + s.rejected,
                relayed: acc.relayed + s.relayed,
            })
    }

    /// Read access to one outlet's state.
    pub fn node(&self, id: NodeId) -> Option<&OutletNode<Outlet, SyntheticProbe>> {
        self.members
            .iter()
            .map(|m| &m.node)
            .find(|n| n.id() == id)
    }

    /// Wall time as seen by outlet `id`.
    pub fn wall_time(&self, id: NodeId) -> Option<NaiveDateTime> {
        self.members
            .iter()
            .find(|m| m.node.id() == id)
            .map(|m| m.clock.now())
    }

    pub fn medium(&self) -> &SharedMedium {
        &self.medium
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed
    }
}
