//! Gossip snapshot exchanged once per send slot, plus its fixed-size wire layout.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Priority value that marks the "no message received" sentinel.
pub const SENTINEL_PRIORITY: i32 = -1;

/// Length of the NUL-padded command buffer in the wire layout.
pub const COMMAND_LEN: usize = 32;

/// Total encoded size: id(2) + forecast(4) + last interval(4) + priority(4) + command(32) + flag(1).
pub const WIRE_LEN: usize = 2 + 4 + 4 + 4 + COMMAND_LEN + 1;

/// Network identity of an outlet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u16);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "outlet-{}", self.0)
    }
}

/// Errors raised while encoding or decoding a snapshot payload.
#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("payload is {0} bytes, expected {expected}", expected = WIRE_LEN)]
    Length(usize),
    #[error("command is {0} bytes, buffer holds {limit}", limit = COMMAND_LEN)]
    CommandTooLong(usize),
    #[error("field `{0}` must be finite and >= 0")]
    InvalidField(&'static str),
    #[error("command buffer is not valid UTF-8")]
    CommandEncoding,
}

/// One node's view of itself, broadcast to peers during the sync window.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Identity of the sending outlet.
    pub sender: NodeId,
    /// Projected energy use from now until month end (kWh).
    pub forecast_kwh: f32,
    /// Energy drawn during the last completed interval (kWh).
    pub last_interval_kwh: f32,
    /// Priority for the current quarter of the day; `-1` marks the sentinel.
    pub priority: i32,
    /// Whether the sender may be shed right now.
    pub can_shed: bool,
    /// Configuration command piggy-backed on the snapshot, if any.
    pub command: Option<String>,
}

impl Snapshot {
    /// The "nothing received" value returned by an empty poll.
    pub fn sentinel() -> Self {
        Self {
            sender: NodeId::default(),
            forecast_kwh: 0.0,
            last_interval_kwh: 0.0,
            priority: SENTINEL_PRIORITY,
            can_shed: false,
            command: None,
        }
    }

    /// Returns `true` for the sentinel, which must never reach a peer table.
    pub fn is_sentinel(&self) -> bool {
        self.priority == SENTINEL_PRIORITY
    }

    /// Returns a copy carrying `command` in its command field.
    pub fn with_command(&self, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..self.clone()
        }
    }

    /// Encodes the snapshot into its fixed-size little-endian layout.
    ///
    /// # Errors
    ///
    /// Returns `WireError::CommandTooLong` if the command does not fit the buffer
    /// and `WireError::InvalidField` if a numeric field is negative or non-finite.
    pub fn encode(&self) -> Result<[u8; WIRE_LEN], WireError> {
        check_field("forecast_kwh", self.forecast_kwh)?;
        check_field("last_interval_kwh", self.last_interval_kwh)?;

        let mut buf = [0u8; WIRE_LEN];
        buf[0..2].copy_from_slice(&self.sender.0.to_le_bytes());
        buf[2..6].copy_from_slice(&self.forecast_kwh.to_le_bytes());
        buf[6..10].copy_from_slice(&self.last_interval_kwh.to_le_bytes());
        buf[10..14].copy_from_slice(&self.priority.to_le_bytes());
        if let Some(command) = &self.command {
            let bytes = command.as_bytes();
            if bytes.len() > COMMAND_LEN {
                return Err(WireError::CommandTooLong(bytes.len()));
            }
            buf[14..14 + bytes.len()].copy_from_slice(bytes);
        }
        buf[WIRE_LEN - 1] = u8::from(self.can_shed);
        Ok(buf)
    }

    /// Decodes a payload produced by [`Snapshot::encode`].
    ///
    /// A payload whose priority is the sentinel value decodes to the sentinel.
    ///
    /// # Errors
    ///
    /// Returns a `WireError` for a wrong length, a malformed command buffer, or
    /// negative/non-finite numeric fields.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != WIRE_LEN {
            return Err(WireError::Length(buf.len()));
        }
        let priority = i32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
        if priority == SENTINEL_PRIORITY {
            return Ok(Self::sentinel());
        }

        let forecast_kwh = f32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let last_interval_kwh = f32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        check_field("forecast_kwh", forecast_kwh)?;
        check_field("last_interval_kwh", last_interval_kwh)?;

        let raw_command = &buf[14..14 + COMMAND_LEN];
        let end = raw_command
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_LEN);
        let command = if end == 0 {
            None
        } else {
            let text =
                std::str::from_utf8(&raw_command[..end]).map_err(|_| WireError::CommandEncoding)?;
            Some(text.to_string())
        };

        Ok(Self {
            sender: NodeId(u16::from_le_bytes([buf[0], buf[1]])),
            forecast_kwh,
            last_interval_kwh,
            priority,
            can_shed: buf[WIRE_LEN - 1] != 0,
            command,
        })
    }
}

fn check_field(name: &'static str, value: f32) -> Result<(), WireError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(WireError::InvalidField(name))
    }
}
