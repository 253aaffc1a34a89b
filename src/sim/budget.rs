//! Monthly energy budget and billing-period bookkeeping.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use tracing::info;

/// Number of sync cycles from `now` until the start of next month.
///
/// Counts every cycle, including a partial one in progress, so the result is
/// at least 1 for any instant inside a month.
pub fn remaining_cycles(now: NaiveDateTime, cycle: TimeDelta) -> u32 {
    let cycle_secs = cycle.num_seconds().max(1);
    let left = (next_month_start(now) - now).num_seconds().max(0);
    u32::try_from((left + cycle_secs - 1) / cycle_secs).unwrap_or(u32::MAX)
}

/// Midnight on the first day of the month after `now`.
pub fn next_month_start(now: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Shared monthly cap plus this node's running view of fleet consumption.
#[derive(Debug, Clone)]
pub struct BudgetState {
    cap_kwh: f32,
    consumed_kwh: f32,
    remaining_cycles: u32,
    period: (i32, u32),
    cycle: TimeDelta,
}

impl BudgetState {
    /// Starts a billing period containing `now`.
    pub fn new(cap_kwh: f32, now: NaiveDateTime, cycle: TimeDelta) -> Self {
        Self {
            cap_kwh: cap_kwh.max(0.0),
            consumed_kwh: 0.0,
            remaining_cycles: remaining_cycles(now, cycle),
            period: (now.year(), now.month()),
            cycle,
        }
    }

    /// A new period begins when the countdown is exhausted or the wall clock
    /// has moved to a different month (restart, clock correction).
    pub fn needs_rollover(&self, now: NaiveDateTime) -> bool {
        self.remaining_cycles == 0 || self.period != (now.year(), now.month())
    }

    /// Resets consumption and recomputes the countdown from wall time.
    pub fn rollover(&mut self, now: NaiveDateTime) {
        info!(
            consumed_kwh = self.consumed_kwh,
            cap_kwh = self.cap_kwh,
            year = now.year(),
            month = now.month(),
            "billing period rollover"
        );
        self.consumed_kwh = 0.0;
        self.period = (now.year(), now.month());
        self.remaining_cycles = remaining_cycles(now, self.cycle);
    }

    /// Recomputes the countdown without touching consumption, after a clock change.
    pub fn resync(&mut self, now: NaiveDateTime) {
        self.remaining_cycles = remaining_cycles(now, self.cycle);
    }

    /// Adds energy consumed anywhere in the fleet during the last interval.
    pub fn record_consumption(&mut self, kwh: f32) {
        if kwh.is_finite() && kwh > 0.0 {
            self.consumed_kwh += kwh;
        }
    }

    /// Ends the current cycle.
    pub fn complete_cycle(&mut self) {
        self.remaining_cycles = self.remaining_cycles.saturating_sub(1);
    }

    pub fn set_cap(&mut self, cap_kwh: f32) {
        self.cap_kwh = cap_kwh.max(0.0);
    }

    pub fn cap_kwh(&self) -> f32 {
        self.cap_kwh
    }

    pub fn consumed_kwh(&self) -> f32 {
        self.consumed_kwh
    }

    /// Budget left this month, never negative.
    pub fn remaining_kwh(&self) -> f32 {
        (self.cap_kwh - self.consumed_kwh).max(0.0)
    }

    pub fn remaining_cycles(&self) -> u32 {
        self.remaining_cycles
    }
}
