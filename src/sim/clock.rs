//! Wall-clock and monotonic time sources.
//!
//! Wall time drives calendar decisions (quarter of day, month rollover) and
//! can be set by an operator. Monotonic time drives deadlines and is never
//! affected by such corrections.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};

/// Time provider consumed by the control loop.
pub trait ClockSource {
    /// Current wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Administrative wall-clock correction.
    fn set(&mut self, wall: NaiveDateTime);

    /// Time elapsed since the clock was created; unaffected by [`ClockSource::set`].
    fn monotonic(&self) -> Duration;

    /// Suspends the caller for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Deterministic clock for simulations. Sleeping advances time instantly.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::NaiveDate;
/// use outlet_shed::sim::clock::{ClockSource, SimClock};
///
/// let start = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap().and_hms_opt(23, 0, 0).unwrap();
/// let mut clock = SimClock::new(start);
/// clock.sleep(Duration::from_secs(2 * 3600));
/// assert_eq!(clock.now().to_string(), "2026-02-01 01:00:00");
/// assert_eq!(clock.monotonic(), Duration::from_secs(7200));
/// ```
#[derive(Debug, Clone)]
pub struct SimClock {
    wall: NaiveDateTime,
    monotonic: Duration,
}

impl SimClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            wall: start,
            monotonic: Duration::ZERO,
        }
    }

    /// Moves both wall and monotonic time forward by `by`.
    pub fn advance(&mut self, by: Duration) {
        self.monotonic += by;
        self.wall += to_delta(by);
    }
}

impl ClockSource for SimClock {
    fn now(&self) -> NaiveDateTime {
        self.wall
    }

    fn set(&mut self, wall: NaiveDateTime) {
        self.wall = wall;
    }

    fn monotonic(&self) -> Duration {
        self.monotonic
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

/// Host clock: local wall time plus an operator-set offset.
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
    offset: TimeDelta,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            offset: TimeDelta::zero(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local() + self.offset
    }

    fn set(&mut self, wall: NaiveDateTime) {
        self.offset = wall - Local::now().naive_local();
    }

    fn monotonic(&self) -> Duration {
        self.started.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Converts a std duration to a chrono delta, saturating on overflow.
pub fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn sim_clock_sleep_advances_both_timelines() {
        let mut clock = SimClock::new(start());
        clock.sleep(Duration::from_secs(90));
        assert_eq!(clock.monotonic(), Duration::from_secs(90));
        assert_eq!(clock.now(), start() + TimeDelta::seconds(90));
    }

    #[test]
    fn setting_wall_time_leaves_monotonic_alone() {
        let mut clock = SimClock::new(start());
        clock.advance(Duration::from_secs(60));
        clock.set(start() - TimeDelta::days(3));
        assert_eq!(clock.monotonic(), Duration::from_secs(60));
        assert_eq!(clock.now(), start() - TimeDelta::days(3));
    }

    #[test]
    fn system_clock_applies_offset() {
        let mut clock = SystemClock::new();
        let target = start();
        clock.set(target);
        let drift = (clock.now() - target).num_seconds().abs();
        assert!(drift < 5);
    }
}
