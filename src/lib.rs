//! Peer-coordinated load shedding for a fleet of smart outlets sharing a
//! monthly energy budget.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod devices;
pub mod forecast;
pub mod io;
/// Snapshot gossip, operator commands, and transports.
pub mod net;
/// Control loop, consensus, shedding policy, and fleet simulation.
pub mod sim;
