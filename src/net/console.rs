//! Local operator channel (the outlet's serial/USB console).

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use chrono::NaiveDateTime;

/// Source of operator command lines. Polling never blocks.
pub trait ConfigChannel {
    /// Next line that is available at wall time `now`, if any.
    fn poll_line(&mut self, now: NaiveDateTime) -> Option<String>;
}

/// Pre-recorded console lines released at fixed wall-clock instants.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConsole {
    pending: VecDeque<(NaiveDateTime, String)>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `line` for release at or after `at`. Lines are kept in time order.
    pub fn push(&mut self, at: NaiveDateTime, line: impl Into<String>) {
        let idx = self.pending.partition_point(|(t, _)| *t <= at);
        self.pending.insert(idx, (at, line.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ConfigChannel for ScriptedConsole {
    fn poll_line(&mut self, now: NaiveDateTime) -> Option<String> {
        if self.pending.front().is_some_and(|(at, _)| *at <= now) {
            self.pending.pop_front().map(|(_, line)| line)
        } else {
            None
        }
    }
}

/// Reads lines from stdin on a helper thread and hands them over through a
/// single-consumer queue, so the control loop stays single-threaded.
#[derive(Debug)]
pub struct StdinConsole {
    lines: Receiver<String>,
    closed: bool,
}

impl StdinConsole {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: rx,
            closed: false,
        }
    }
}

impl ConfigChannel for StdinConsole {
    fn poll_line(&mut self, _now: NaiveDateTime) -> Option<String> {
        if self.closed {
            return None;
        }
        match self.lines.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .and_then(|d| d.and_hms_opt(0, minute, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn lines_are_released_in_time_order() {
        let mut console = ScriptedConsole::new();
        console.push(t(30), "second");
        console.push(t(10), "first");

        assert_eq!(console.poll_line(t(5)), None);
        assert_eq!(console.poll_line(t(10)).as_deref(), Some("first"));
        assert_eq!(console.poll_line(t(20)), None);
        assert_eq!(console.poll_line(t(45)).as_deref(), Some("second"));
        assert!(console.is_empty());
    }
}
