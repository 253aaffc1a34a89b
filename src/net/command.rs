//! Operator configuration commands and their text grammar.
//!
//! A command line is `<TARGET> <VERB> <ARGS...>`, whitespace separated and
//! case-insensitive:
//!
//! | verb                    | arguments                     | effect                         |
//! |-------------------------|-------------------------------|--------------------------------|
//! | `CONSUMO` / `BUDGET`    | `<kwh>` (leading zeros ok)    | set the monthly cap            |
//! | `PRIORIDADE` / `PRIORITY` | `<quarter 1-4> <priority>`  | set a quarter's priority       |
//! | `DESLIGAVEL` / `SHED`   | `<quarter 1-4> <0\|1>`        | set a quarter's shed permission |
//! | `HORARIO` / `CLOCK`     | `<YYYYMMDDhhmmss>`            | set the wall clock             |
//!
//! `TARGET` is `TODAS` / `ALL` or a decimal outlet id.
//! A line must fit the 32-byte command field of a snapshot so it can be relayed.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use thiserror::Error;

use super::snapshot::{COMMAND_LEN, NodeId};
use crate::sim::schedule::Quarter;

const CLOCK_FORMAT: &str = "%Y%m%d%H%M%S";

/// Who a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Node(NodeId),
}

/// Typed configuration change.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    SetPriority { quarter: Quarter, priority: i32 },
    SetShedPermission { quarter: Quarter, allowed: bool },
    SetClock(NaiveDateTime),
    SetBudget(f32),
}

/// Channel a command arrived on. Only locally received commands are relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Operator console attached to this outlet.
    Local,
    /// Piggy-backed on a peer snapshot.
    Gossip,
}

/// A parsed command together with its original text, which is what gets relayed.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target: Target,
    pub kind: CommandKind,
    pub line: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown target `{0}`")]
    UnknownTarget(String),
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("`{verb}` is missing its {what} argument")]
    MissingArgument { verb: String, what: &'static str },
    #[error("invalid {what} `{value}`")]
    InvalidArgument { what: &'static str, value: String },
    #[error("unexpected trailing argument `{0}`")]
    Trailing(String),
    #[error("command is {0} bytes, at most {limit} fit in a snapshot", limit = COMMAND_LEN)]
    TooLong(usize),
}

impl Command {
    /// Returns `true` if this outlet should apply the command.
    pub fn addresses(&self, id: NodeId) -> bool {
        match self.target {
            Target::All => true,
            Target::Node(target) => target == id,
        }
    }

    /// Whether a command received on `origin` at outlet `id` must be re-broadcast.
    ///
    /// Local commands not meant exclusively for this outlet are relayed once;
    /// gossip-borne commands never are, which stops relay loops.
    pub fn should_relay(&self, origin: CommandOrigin, id: NodeId) -> bool {
        origin == CommandOrigin::Local && self.target != Target::Node(id)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.len() > COMMAND_LEN {
            return Err(CommandError::TooLong(line.len()));
        }
        let mut tokens = line.split_whitespace();

        let target = match tokens.next() {
            None => return Err(CommandError::Empty),
            Some(t) if t.eq_ignore_ascii_case("TODAS") || t.eq_ignore_ascii_case("ALL") => {
                Target::All
            }
            Some(t) => t
                .parse::<u16>()
                .map(|id| Target::Node(NodeId(id)))
                .map_err(|_| CommandError::UnknownTarget(t.to_string()))?,
        };

        let verb = tokens
            .next()
            .ok_or_else(|| CommandError::UnknownVerb(String::new()))?
            .to_ascii_uppercase();

        let mut arg = |what: &'static str| {
            tokens.next().ok_or_else(|| CommandError::MissingArgument {
                verb: verb.clone(),
                what,
            })
        };

        let kind = match verb.as_str() {
            "CONSUMO" | "BUDGET" => {
                let raw = arg("budget")?;
                let kwh = raw
                    .parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| invalid("budget", raw))?;
                CommandKind::SetBudget(kwh)
            }
            "PRIORIDADE" | "PRIORITY" => {
                let quarter = parse_quarter(arg("quarter")?)?;
                let raw = arg("priority")?;
                let priority = raw
                    .parse::<i32>()
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| invalid("priority", raw))?;
                CommandKind::SetPriority { quarter, priority }
            }
            "DESLIGAVEL" | "SHED" => {
                let quarter = parse_quarter(arg("quarter")?)?;
                let allowed = match arg("permission")? {
                    "1" => true,
                    "0" => false,
                    other => return Err(invalid("permission", other)),
                };
                CommandKind::SetShedPermission { quarter, allowed }
            }
            "HORARIO" | "CLOCK" => {
                let raw = arg("timestamp")?;
                let at = NaiveDateTime::parse_from_str(raw, CLOCK_FORMAT)
                    .map_err(|_| invalid("timestamp", raw))?;
                CommandKind::SetClock(at)
            }
            _ => return Err(CommandError::UnknownVerb(verb)),
        };

        if let Some(extra) = tokens.next() {
            return Err(CommandError::Trailing(extra.to_string()));
        }

        Ok(Self {
            target,
            kind,
            line: line.to_string(),
        })
    }
}

fn parse_quarter(raw: &str) -> Result<Quarter, CommandError> {
    raw.parse::<u8>()
        .ok()
        .and_then(Quarter::from_number)
        .ok_or_else(|| invalid("quarter", raw))
}

fn invalid(what: &'static str, value: &str) -> CommandError {
    CommandError::InvalidArgument {
        what,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_broadcast_budget() {
        let cmd: Command = "TODAS CONSUMO 000000050000".parse().expect("valid command");
        assert_eq!(cmd.target, Target::All);
        assert_eq!(cmd.kind, CommandKind::SetBudget(50000.0));
        assert_eq!(cmd.line, "TODAS CONSUMO 000000050000");
    }

    #[test]
    fn parses_addressed_priority() {
        let cmd: Command = "12 prioridade 3 7".parse().expect("valid command");
        assert_eq!(cmd.target, Target::Node(NodeId(12)));
        assert_eq!(
            cmd.kind,
            CommandKind::SetPriority {
                quarter: Quarter::Afternoon,
                priority: 7
            }
        );
    }

    #[test]
    fn parses_shed_permission_and_clock() {
        let cmd: Command = "ALL SHED 2 0".parse().expect("valid command");
        assert_eq!(
            cmd.kind,
            CommandKind::SetShedPermission {
                quarter: Quarter::Morning,
                allowed: false
            }
        );

        let cmd: Command = "4 HORARIO 20260215133000".parse().expect("valid command");
        let expected = NaiveDate::from_ymd_opt(2026, 2, 15).and_then(|d| d.and_hms_opt(13, 30, 0));
        assert_eq!(Some(cmd.kind), expected.map(CommandKind::SetClock));
    }

    #[test]
    fn rejects_out_of_range_arguments() {
        assert!(matches!(
            "TODAS PRIORIDADE 1 0".parse::<Command>(),
            Err(CommandError::InvalidArgument { what: "priority", .. })
        ));
        assert!(matches!(
            "TODAS PRIORIDADE 5 2".parse::<Command>(),
            Err(CommandError::InvalidArgument { what: "quarter", .. })
        ));
        assert!(matches!(
            "TODAS CONSUMO -10".parse::<Command>(),
            Err(CommandError::InvalidArgument { what: "budget", .. })
        ));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert!(matches!(
            "KITCHEN CONSUMO 1".parse::<Command>(),
            Err(CommandError::UnknownTarget(_))
        ));
        assert!(matches!(
            "TODAS DANCE".parse::<Command>(),
            Err(CommandError::UnknownVerb(_))
        ));
        assert!(matches!(
            "TODAS CONSUMO".parse::<Command>(),
            Err(CommandError::MissingArgument { .. })
        ));
        assert!(matches!(
            "TODAS CONSUMO 10 20".parse::<Command>(),
            Err(CommandError::Trailing(_))
        ));
    }

    #[test]
    fn lines_must_fit_the_snapshot_buffer() {
        let longest = "TODAS CONSUMO 000000000000000250";
        assert_eq!(longest.len(), COMMAND_LEN);
        let cmd: Command = longest.parse().expect("valid command");
        assert_eq!(cmd.kind, CommandKind::SetBudget(250.0));

        let over = "TODAS CONSUMO 00000000000000000000000250";
        assert_eq!(over.parse::<Command>(), Err(CommandError::TooLong(40)));
    }

    #[test]
    fn relay_rule_prevents_loops() {
        let me = NodeId(3);
        let broadcast: Command = "TODAS CONSUMO 100".parse().expect("valid command");
        assert!(broadcast.should_relay(CommandOrigin::Local, me));
        assert!(!broadcast.should_relay(CommandOrigin::Gossip, me));

        let mine: Command = "3 CONSUMO 100".parse().expect("valid command");
        assert!(!mine.should_relay(CommandOrigin::Local, me));
        assert!(mine.addresses(me));

        let theirs: Command = "9 CONSUMO 100".parse().expect("valid command");
        assert!(theirs.should_relay(CommandOrigin::Local, me));
        assert!(!theirs.addresses(me));
    }
}
