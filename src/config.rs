//! TOML-based scenario configuration and preset definitions.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::command::Command;
use crate::net::snapshot::NodeId;
use crate::sim::control::LoopTiming;
use crate::sim::node::NodeSettings;
use crate::sim::schedule::{PrioritySchedule, ShedPermission};
use crate::sim::sync::{DEFAULT_RECEIVE_ATTEMPTS, DEFAULT_SENDS, SyncConfig};

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults; `[[outlets]]` must list at least one outlet.
/// Load from TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation span and seed.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Cycle cadence.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Synchronization window and channel quality.
    #[serde(default)]
    pub sync: SyncSection,
    /// Shared monthly budget.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// The fleet.
    #[serde(default)]
    pub outlets: Vec<OutletConfig>,
    /// Scripted operator commands.
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Wall-clock start, `YYYY-MM-DDThh:mm:ss`.
    pub start: NaiveDateTime,
    /// Number of sync cycles to simulate (must be > 0).
    pub cycles: u64,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2026, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            cycles: 124,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Sync cycle length in minutes; must divide a day.
    pub cycle_minutes: u32,
    /// Polling slice between cycles; must divide `cycle_minutes`.
    pub poll_minutes: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_minutes: 360,
            poll_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    /// Window length in seconds (60..=300).
    pub window_secs: u64,
    /// Broadcasts per window.
    pub sends: u32,
    /// Receive polls per window.
    pub receive_attempts: u32,
    /// Per-delivery loss probability of the simulated medium, in `[0, 1)`.
    pub loss_probability: f64,
    /// Cycles of silence before a peer is evicted; 0 disables eviction.
    pub stale_after_cycles: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            window_secs: 60,
            sends: DEFAULT_SENDS,
            receive_attempts: DEFAULT_RECEIVE_ATTEMPTS,
            loss_probability: 0.0,
            stale_after_cycles: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Fleet-wide monthly cap (kWh).
    pub monthly_cap_kwh: f32,
    /// Rolling history window length (samples).
    pub history_slots: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_cap_kwh: 3000.0,
            history_slots: crate::forecast::DEFAULT_HISTORY_SLOTS,
        }
    }
}

/// One outlet and its synthetic load profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutletConfig {
    /// Network identity (non-zero, unique).
    pub id: u16,
    #[serde(default)]
    pub dimmable: bool,
    /// Priority per quarter of the day (00-06, 06-12, 12-18, 18-24), each >= 1.
    pub priorities: [i32; 4],
    /// Shed permission per quarter of the day.
    #[serde(default = "all_quarters")]
    pub shed_permissions: [bool; 4],
    /// Baseline draw (kW).
    pub base_kw: f32,
    /// Sinusoidal daily amplitude (kW).
    #[serde(default)]
    pub amp_kw: f32,
    /// Phase offset (radians).
    #[serde(default)]
    pub phase_rad: f32,
    /// Gaussian noise standard deviation (kW).
    #[serde(default)]
    pub noise_std: f32,
}

fn all_quarters() -> [bool; 4] {
    [true; 4]
}

/// An operator command typed into one outlet's console.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    /// Minutes after `simulation.start`.
    pub at_minute: u64,
    /// Outlet whose console receives the line.
    pub node: u16,
    /// Command text.
    pub line: String,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"timing.cycle_minutes"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Seed offset between outlets so their noise streams are uncorrelated.
const OUTLET_SEED_STRIDE: u64 = 7919;

impl OutletConfig {
    fn profile(
        id: u16,
        dimmable: bool,
        priorities: [i32; 4],
        shed_permissions: [bool; 4],
        base_kw: f32,
        amp_kw: f32,
        phase_rad: f32,
    ) -> Self {
        Self {
            id,
            dimmable,
            priorities,
            shed_permissions,
            base_kw,
            amp_kw,
            phase_rad,
            noise_std: 0.05,
        }
    }

    /// Seed for this outlet's probe.
    pub fn seed(&self, master: u64) -> u64 {
        master.wrapping_add(u64::from(self.id).wrapping_mul(OUTLET_SEED_STRIDE))
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: four outlets, one month at 6 h cycles,
    /// a cap the fleet can mostly live with.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            timing: TimingConfig::default(),
            sync: SyncSection::default(),
            budget: BudgetConfig::default(),
            outlets: vec![
                // space heater
                OutletConfig::profile(1, true, [2, 3, 3, 2], [true; 4], 1.5, 0.8, 0.0),
                // refrigerator, never shed
                OutletConfig::profile(2, false, [5, 5, 5, 5], [false; 4], 0.15, 0.05, 0.0),
                // living-room lamp
                OutletConfig::profile(3, true, [1, 2, 2, 3], [true; 4], 0.3, 0.2, 3.1),
                // water heater
                OutletConfig::profile(4, false, [2, 2, 2, 2], [true, true, true, false], 1.2, 0.4, 1.2),
            ],
            commands: Vec::new(),
        }
    }

    /// Returns the tight-budget preset: the baseline fleet under half the cap,
    /// plus an operator who raises the lamp's evening priority mid-month.
    pub fn tight_budget() -> Self {
        Self {
            budget: BudgetConfig {
                monthly_cap_kwh: 1200.0,
                ..BudgetConfig::default()
            },
            commands: vec![CommandConfig {
                at_minute: 10 * 24 * 60,
                node: 3,
                line: "3 PRIORIDADE 4 5".to_string(),
            }],
            ..Self::baseline()
        }
    }

    /// Returns the lossy preset: a poor channel, a longer window, and a
    /// fleet-wide budget change typed into one outlet's console.
    pub fn lossy() -> Self {
        Self {
            sync: SyncSection {
                window_secs: 120,
                loss_probability: 0.3,
                ..SyncSection::default()
            },
            budget: BudgetConfig {
                monthly_cap_kwh: 2000.0,
                ..BudgetConfig::default()
            },
            commands: vec![CommandConfig {
                at_minute: 5 * 24 * 60,
                node: 2,
                line: "TODAS CONSUMO 1800".to_string(),
            }],
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "tight_budget", "lossy"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "tight_budget" => Ok(Self::tight_budget()),
            "lossy" => Ok(Self::lossy()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.simulation.cycles == 0 {
            errors.push(ConfigError::new("simulation.cycles", "must be > 0"));
        }

        let t = &self.timing;
        if t.cycle_minutes == 0 || 1440 % t.cycle_minutes != 0 {
            errors.push(ConfigError::new(
                "timing.cycle_minutes",
                "must be > 0 and divide 1440",
            ));
        }
        if t.poll_minutes == 0 || (t.cycle_minutes > 0 && t.cycle_minutes % t.poll_minutes != 0) {
            errors.push(ConfigError::new(
                "timing.poll_minutes",
                "must be > 0 and divide timing.cycle_minutes",
            ));
        }

        let s = &self.sync;
        if !(60..=300).contains(&s.window_secs) {
            errors.push(ConfigError::new("sync.window_secs", "must be in [60, 300]"));
        } else if s.window_secs >= u64::from(t.cycle_minutes) * 60 {
            errors.push(ConfigError::new(
                "sync.window_secs",
                "must be shorter than one cycle",
            ));
        }
        if s.sends == 0 {
            errors.push(ConfigError::new("sync.sends", "must be > 0"));
        }
        if s.receive_attempts == 0 {
            errors.push(ConfigError::new("sync.receive_attempts", "must be > 0"));
        }
        if !(0.0..1.0).contains(&s.loss_probability) {
            errors.push(ConfigError::new(
                "sync.loss_probability",
                "must be in [0.0, 1.0)",
            ));
        }

        let b = &self.budget;
        if !b.monthly_cap_kwh.is_finite() || b.monthly_cap_kwh <= 0.0 {
            errors.push(ConfigError::new("budget.monthly_cap_kwh", "must be > 0"));
        }
        if b.history_slots == 0 {
            errors.push(ConfigError::new("budget.history_slots", "must be > 0"));
        }

        if self.outlets.is_empty() {
            errors.push(ConfigError::new("outlets", "at least one outlet is required"));
        }
        let mut seen = BTreeSet::new();
        for (i, o) in self.outlets.iter().enumerate() {
            if o.id == 0 {
                errors.push(ConfigError::new(format!("outlets[{i}].id"), "must be non-zero"));
            } else if !seen.insert(o.id) {
                errors.push(ConfigError::new(
                    format!("outlets[{i}].id"),
                    format!("duplicate id {}", o.id),
                ));
            }
            if o.priorities.iter().any(|p| *p < 1) {
                errors.push(ConfigError::new(
                    format!("outlets[{i}].priorities"),
                    "every priority must be >= 1",
                ));
            }
            if !o.base_kw.is_finite() || o.base_kw < 0.0 {
                errors.push(ConfigError::new(format!("outlets[{i}].base_kw"), "must be >= 0"));
            }
            if !o.noise_std.is_finite() || o.noise_std < 0.0 {
                errors.push(ConfigError::new(
                    format!("outlets[{i}].noise_std"),
                    "must be >= 0",
                ));
            }
        }

        for (i, c) in self.commands.iter().enumerate() {
            if !seen.contains(&c.node) {
                errors.push(ConfigError::new(
                    format!("commands[{i}].node"),
                    format!("no outlet with id {}", c.node),
                ));
            }
            if let Err(e) = c.line.parse::<Command>() {
                errors.push(ConfigError::new(format!("commands[{i}].line"), e.to_string()));
            }
        }

        errors
    }

    /// Cycle length as a chrono delta.
    pub fn cycle_delta(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.timing.cycle_minutes))
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming::new(
            Duration::from_secs(u64::from(self.timing.cycle_minutes) * 60),
            Duration::from_secs(u64::from(self.timing.poll_minutes) * 60),
        )
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(
            Duration::from_secs(self.sync.window_secs),
            self.sync.sends,
            self.sync.receive_attempts,
        )
    }

    /// Looks up an outlet by id.
    pub fn outlet(&self, id: u16) -> Option<&OutletConfig> {
        self.outlets.iter().find(|o| o.id == id)
    }

    /// Builds the static settings for `outlet`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the outlet's priorities are out of range.
    pub fn node_settings(&self, outlet: &OutletConfig) -> Result<NodeSettings, ConfigError> {
        let schedule = PrioritySchedule::new(outlet.priorities).map_err(|e| {
            ConfigError::new(format!("outlets.{}.priorities", outlet.id), e.to_string())
        })?;
        Ok(NodeSettings {
            id: NodeId(outlet.id),
            cycle: self.cycle_delta(),
            history_slots: self.budget.history_slots,
            monthly_cap_kwh: self.budget.monthly_cap_kwh,
            schedule,
            permissions: ShedPermission::new(outlet.shed_permissions),
            sync: self.sync_config(),
            stale_after_cycles: self.sync.stale_after_cycles,
        })
    }
}
