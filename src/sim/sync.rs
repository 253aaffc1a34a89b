//! Periodic snapshot exchange between outlets.
//!
//! The exchange is a pollable state machine so that a live loop can drive it
//! against the real clock and a simulation can step many nodes in lockstep.

use std::time::Duration;

use tracing::debug;

use super::clock::ClockSource;
use super::control::CancelToken;
use super::peers::{PeerTable, Upsert};
use crate::net::snapshot::Snapshot;
use crate::net::transport::Transport;

/// Default number of broadcasts per window.
pub const DEFAULT_SENDS: u32 = 15;
/// Default number of receive polls per window.
pub const DEFAULT_RECEIVE_ATTEMPTS: u32 = 300;

/// Shape of one synchronization window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Total duration of the window.
    pub window: Duration,
    /// Number of times the local snapshot is broadcast within the window.
    pub sends: u32,
    /// Number of receive polls within the window.
    pub receive_attempts: u32,
}

impl SyncConfig {
    /// Creates a window description.
    ///
    /// # Panics
    ///
    /// Panics if `sends` or `receive_attempts` is zero.
    pub fn new(window: Duration, sends: u32, receive_attempts: u32) -> Self {
        assert!(sends > 0, "sends must be > 0");
        assert!(receive_attempts > 0, "receive_attempts must be > 0");
        Self {
            window,
            sends,
            receive_attempts,
        }
    }

    /// Minimum spacing between two broadcasts.
    pub fn send_interval(&self) -> Duration {
        self.window / self.sends
    }

    /// Spacing between two receive polls.
    pub fn receive_interval(&self) -> Duration {
        self.window / self.receive_attempts
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(60),
            DEFAULT_SENDS,
            DEFAULT_RECEIVE_ATTEMPTS,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No window open.
    Idle,
    /// Interleaving broadcasts and receive polls.
    Exchanging,
    /// Window elapsed; the node proceeds with whatever it heard.
    Drained,
}

/// Counters for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Broadcasts issued.
    pub sent: u32,
    /// Snapshots stored in the peer table.
    pub received: u32,
    /// Snapshots discarded (own echo).
    pub ignored: u32,
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    phase: SyncPhase,
    started: Duration,
    last_send: Option<Duration>,
    report: SyncReport,
    commands: Vec<String>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            phase: SyncPhase::Idle,
            started: Duration::ZERO,
            last_send: None,
            report: SyncReport::default(),
            commands: Vec::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn report(&self) -> SyncReport {
        self.report
    }

    /// Opens a new window at monotonic instant `now`.
    pub fn begin(&mut self, now: Duration) {
        self.phase = SyncPhase::Exchanging;
        self.started = now;
        self.last_send = None;
        self.report = SyncReport::default();
        self.commands.clear();
    }

    /// Performs one step of the exchange: a broadcast when one is due,
    /// otherwise a single non-blocking receive.
    ///
    /// Received snapshots go straight into `peers` tagged with `cycle`.
    /// Commands they carry are kept for [`SyncEngine::take_commands`].
    pub fn poll<T: Transport + ?Sized>(
        &mut self,
        now: Duration,
        transport: &mut T,
        snapshot: &Snapshot,
        peers: &mut PeerTable,
        cycle: u64,
    ) -> SyncPhase {
        if self.phase != SyncPhase::Exchanging {
            return self.phase;
        }

        if now.saturating_sub(self.started) >= self.config.window {
            self.phase = SyncPhase::Drained;
            debug!(
                node = %transport.local_id(),
                sent = self.report.sent,
                received = self.report.received,
                peers = peers.len(),
                "sync window drained"
            );
            return self.phase;
        }

        let send_due = self
            .last_send
            .is_none_or(|at| now.saturating_sub(at) >= self.config.send_interval());
        if send_due {
            transport.broadcast(snapshot);
            self.last_send = Some(now);
            self.report.sent += 1;
            return self.phase;
        }

        let incoming = transport.poll();
        if incoming.is_sentinel() {
            return self.phase;
        }
        if let Some(command) = &incoming.command {
            self.commands.push(command.clone());
        }
        match peers.upsert(&incoming, cycle) {
            Upsert::Inserted | Upsert::Replaced => self.report.received += 1,
            Upsert::Ignored => self.report.ignored += 1,
        }
        self.phase
    }

    /// Command lines gossiped to this node since the last call.
    pub fn take_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }

    /// Runs a whole window against `clock`, sleeping one receive interval
    /// between polls. Stops early when `cancel` fires.
    pub fn run<C, T>(
        &mut self,
        clock: &mut C,
        transport: &mut T,
        snapshot: &Snapshot,
        peers: &mut PeerTable,
        cycle: u64,
        cancel: &CancelToken,
    ) -> SyncReport
    where
        C: ClockSource + ?Sized,
        T: Transport + ?Sized,
    {
        self.begin(clock.monotonic());
        while !cancel.is_cancelled() {
            let phase = self.poll(clock.monotonic(), transport, snapshot, peers, cycle);
            if phase == SyncPhase::Drained {
                break;
            }
            clock.sleep(self.config.receive_interval());
        }
        self.report
    }
}
