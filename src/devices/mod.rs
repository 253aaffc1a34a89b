//! Outlet hardware: relay/dimmer actuation and consumption metering.

/// Relay and dimmer model.
pub mod outlet;
/// Synthetic consumption meter.
pub mod probe;
pub mod types;

// Re-export the main types for convenience
pub use outlet::Outlet;
pub use probe::SyntheticProbe;
pub use types::{Actuator, ConsumptionProbe};
