//! Peer communication: snapshot wire format, operator commands, and transports.

/// Typed operator commands and their text grammar.
pub mod command;
/// Local operator console channels.
pub mod console;
pub mod medium;
pub mod snapshot;
pub mod transport;
/// UDP broadcast transport for live outlets.
pub mod udp;

pub use command::{Command, CommandKind, CommandOrigin, Target};
pub use snapshot::{NodeId, Snapshot};
pub use transport::Transport;
