use tracing::debug;

use super::types::Actuator;
use crate::net::snapshot::NodeId;

/// A simulated smart outlet: one relay, optionally a dimmer.
///
/// Dimming capability is a plain flag rather than a separate type; on an
/// outlet without a dimmer, dim requests are ignored and the output is
/// either fully on or fully off.
///
/// # Examples
///
/// ```
/// use outlet_shed::devices::{Actuator, Outlet};
/// use outlet_shed::net::NodeId;
///
/// let mut lamp = Outlet::new(NodeId(3), true);
/// lamp.set_dim_level(0.4);
/// assert_eq!(lamp.output_level(), 0.4);
/// lamp.turn_off();
/// assert_eq!(lamp.output_level(), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct Outlet {
    id: NodeId,
    dimmable: bool,
    on: bool,
    dim_level: f32,
}

impl Outlet {
    /// Creates an outlet that starts switched on at full power.
    pub fn new(id: NodeId, dimmable: bool) -> Self {
        Self {
            id,
            dimmable,
            on: true,
            dim_level: 1.0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Configured dim level, regardless of relay state.
    pub fn dim_level(&self) -> f32 {
        self.dim_level
    }
}

impl Actuator for Outlet {
    fn turn_on(&mut self) {
        if !self.on {
            debug!(outlet = %self.id, "relay closed");
        }
        self.on = true;
    }

    fn turn_off(&mut self) {
        if self.on {
            debug!(outlet = %self.id, "relay opened");
        }
        self.on = false;
    }

    fn set_dim_level(&mut self, level: f32) {
        if !self.dimmable {
            return;
        }
        self.dim_level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    fn is_on(&self) -> bool {
        self.on
    }

    fn output_level(&self) -> f32 {
        if !self.on {
            0.0
        } else if self.dimmable {
            self.dim_level
        } else {
            1.0
        }
    }

    fn dimmable(&self) -> bool {
        self.dimmable
    }
}
