//! Live control loop for a single outlet.
//!
//! Cycles are aligned to multiples of the cycle length since midnight. Each
//! deadline is derived from the previous deadline rather than from the time
//! the previous cycle finished, so processing time never accumulates as drift.
//! Between cycles the loop sleeps in short slices, polling the console and the
//! transport and sampling consumption on every slice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};
use tracing::{info, warn};

use super::clock::ClockSource;
use super::node::OutletNode;
use super::sync::SyncPhase;
use super::types::CycleRecord;
use crate::devices::{Actuator, ConsumptionProbe};
use crate::net::command::CommandOrigin;
use crate::net::console::ConfigChannel;
use crate::net::transport::Transport;

/// Cooperative shutdown flag, cheap to clone and share with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cycle length and the polling slice used between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub cycle: Duration,
    pub poll: Duration,
}

impl LoopTiming {
    /// # Panics
    ///
    /// Panics if either duration is zero.
    pub fn new(cycle: Duration, poll: Duration) -> Self {
        assert!(!cycle.is_zero(), "cycle must be > 0");
        assert!(!poll.is_zero(), "poll must be > 0");
        Self { cycle, poll }
    }

    /// Time from `now` until the next multiple of the cycle since midnight.
    /// Zero when `now` sits exactly on a boundary.
    pub fn until_boundary(&self, now: NaiveDateTime) -> Duration {
        let cycle_ms = self.cycle.as_millis().max(1);
        let since_midnight = u128::from(now.num_seconds_from_midnight()) * 1000
            + u128::from(now.nanosecond() / 1_000_000);
        let rem = since_midnight % cycle_ms;
        if rem == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(u64::try_from(cycle_ms - rem).unwrap_or(u64::MAX))
        }
    }
}

pub struct ControlLoop<A, P, C, T, K> {
    node: OutletNode<A, P>,
    clock: C,
    transport: T,
    console: K,
    timing: LoopTiming,
    cancel: CancelToken,
    next_deadline: Option<Duration>,
    overruns: u64,
}

impl<A, P, C, T, K> ControlLoop<A, P, C, T, K>
where
    A: Actuator,
    P: ConsumptionProbe,
    C: ClockSource,
    T: Transport,
    K: ConfigChannel,
{
    pub fn new(
        node: OutletNode<A, P>,
        clock: C,
        transport: T,
        console: K,
        timing: LoopTiming,
        cancel: CancelToken,
    ) -> Self {
        Self {
            node,
            clock,
            transport,
            console,
            timing,
            cancel,
            next_deadline: None,
            overruns: 0,
        }
    }

    pub fn node(&self) -> &OutletNode<A, P> {
        &self.node
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Cycles whose processing ran past the following deadline.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Runs until cancelled. Returns the number of completed cycles.
    pub fn run(&mut self) -> u64 {
        let mut completed = 0;
        while let Some(record) = self.run_cycle() {
            info!("{record}");
            completed += 1;
        }
        completed
    }

    /// Runs at most `n` cycles, stopping early on cancellation.
    pub fn run_cycles(&mut self, n: usize) -> Vec<CycleRecord> {
        let mut records = Vec::with_capacity(n);
        for _ in 0..n {
            match self.run_cycle() {
                Some(record) => records.push(record),
                None => break,
            }
        }
        records
    }

    /// Waits for the next deadline and runs one full cycle.
    ///
    /// Returns `None` once the cancel token has fired.
    pub fn run_cycle(&mut self) -> Option<CycleRecord> {
        let deadline = match self.next_deadline {
            Some(deadline) => deadline,
            None => self.clock.monotonic() + self.timing.until_boundary(self.clock.now()),
        };

        if !self.idle_until(deadline) {
            return None;
        }

        let now = self.clock.now();
        let mono = self.clock.monotonic();
        self.node.begin_cycle(now, mono);
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let phase = self.node.poll_sync(&mut self.clock, &mut self.transport);
            if phase == SyncPhase::Drained {
                break;
            }
            let pause = self.node.sync_config().receive_interval();
            self.clock.sleep(pause);
        }
        let record = self.node.finish_cycle();

        let mut next = deadline + self.timing.cycle;
        let finished = self.clock.monotonic();
        if finished >= next {
            self.overruns += 1;
            warn!(
                node = %self.node.id(),
                late_ms = (finished - next).as_millis() as u64,
                "cycle overran its slot"
            );
            while next <= finished {
                next += self.timing.cycle;
            }
        }
        self.next_deadline = Some(next);
        Some(record)
    }

    /// Sleeps in polling slices until `deadline`. Returns `false` if cancelled.
    fn idle_until(&mut self, deadline: Duration) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            self.poll_io();
            let now = self.clock.monotonic();
            if now >= deadline {
                return true;
            }
            self.clock.sleep(self.timing.poll.min(deadline - now));
        }
    }

    fn poll_io(&mut self) {
        while let Some(line) = self.console.poll_line(self.clock.now()) {
            self.node.handle_command_line(
                &line,
                CommandOrigin::Local,
                &mut self.clock,
                &mut self.transport,
            );
        }
        self.node
            .drain_transport(&mut self.clock, &mut self.transport);
        self.node.sample(self.clock.now());
    }
}
