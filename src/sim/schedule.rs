//! Quarter-of-day priority and shed-permission schedules.

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use thiserror::Error;

/// One of the four six-hour windows of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quarter {
    /// 00:00 to 06:00.
    Night,
    /// 06:00 to 12:00.
    Morning,
    /// 12:00 to 18:00.
    Afternoon,
    /// 18:00 to 24:00.
    Evening,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [
        Quarter::Night,
        Quarter::Morning,
        Quarter::Afternoon,
        Quarter::Evening,
    ];

    /// Quarter containing `hour` (0-23).
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => Quarter::Night,
            6..=11 => Quarter::Morning,
            12..=17 => Quarter::Afternoon,
            _ => Quarter::Evening,
        }
    }

    /// Quarter containing the wall-clock instant `at`.
    pub fn at(at: NaiveDateTime) -> Self {
        Self::from_hour(at.hour())
    }

    /// Quarter from its 1-based operator number (1 = 00-06 ... 4 = 18-24).
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1..=4 => Some(Self::ALL[usize::from(n - 1)]),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Rejected schedule write.
#[derive(Debug, Error, PartialEq)]
#[error("priority must be >= 1, got {0}")]
pub struct ScheduleError(pub i32);

/// Priority per quarter of the day. Higher values are more important.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritySchedule([i32; 4]);

impl PrioritySchedule {
    /// Creates a schedule from per-quarter priorities.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError` if any priority is below 1.
    pub fn new(priorities: [i32; 4]) -> Result<Self, ScheduleError> {
        if let Some(&bad) = priorities.iter().find(|&&p| p < 1) {
            return Err(ScheduleError(bad));
        }
        Ok(Self(priorities))
    }

    /// Same priority in every quarter.
    pub fn uniform(priority: i32) -> Result<Self, ScheduleError> {
        Self::new([priority; 4])
    }

    pub fn priority_in(&self, quarter: Quarter) -> i32 {
        self.0[quarter.index()]
    }

    /// Priority in force at `at`.
    pub fn priority_at(&self, at: NaiveDateTime) -> i32 {
        self.priority_in(Quarter::at(at))
    }

    /// Overwrites one quarter's priority.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError` and leaves the schedule unchanged if `priority` is below 1.
    pub fn set(&mut self, quarter: Quarter, priority: i32) -> Result<(), ScheduleError> {
        if priority < 1 {
            return Err(ScheduleError(priority));
        }
        self.0[quarter.index()] = priority;
        Ok(())
    }

    pub fn as_array(&self) -> [i32; 4] {
        self.0
    }
}

/// Whether the outlet may be shed, per quarter of the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShedPermission([bool; 4]);

impl ShedPermission {
    pub fn new(allowed: [bool; 4]) -> Self {
        Self(allowed)
    }

    /// Permission in force at `at`.
    pub fn allowed_at(&self, at: NaiveDateTime) -> bool {
        self.allowed_in(Quarter::at(at))
    }

    pub fn allowed_in(&self, quarter: Quarter) -> bool {
        self.0[quarter.index()]
    }

    pub fn set(&mut self, quarter: Quarter, allowed: bool) {
        self.0[quarter.index()] = allowed;
    }

    pub fn as_array(&self) -> [bool; 4] {
        self.0
    }
}

impl Default for ShedPermission {
    fn default() -> Self {
        Self([true; 4])
    }
}
