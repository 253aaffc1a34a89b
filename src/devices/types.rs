//! Common traits for the outlet hardware the control loop drives and reads.

use chrono::NaiveDateTime;
use rand::{Rng, rngs::StdRng};

/// Relay (and optional dimmer) of one outlet.
pub trait Actuator {
    /// Closes the relay.
    fn turn_on(&mut self);

    /// Opens the relay.
    fn turn_off(&mut self);

    /// Sets the output fraction in `[0, 1]`. Ignored by outlets without a dimmer.
    fn set_dim_level(&mut self, level: f32);

    /// Relay readback.
    fn is_on(&self) -> bool;

    /// Current output fraction; `0.0` whenever the relay is open.
    fn output_level(&self) -> f32;

    /// Whether the outlet has a dimmer.
    fn dimmable(&self) -> bool;
}

/// Energy meter attached to one outlet.
pub trait ConsumptionProbe {
    /// Energy drawn (kWh) over the `hours` ending at `at`, given the outlet's
    /// output fraction. Returns `0.0` when `output_level` is zero.
    fn sample(&mut self, at: NaiveDateTime, hours: f32, output_level: f32) -> f32;
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f32) -> f32 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f32 = rng.random::<f32>().clamp(1e-6, 1.0);
    let u2: f32 = rng.random::<f32>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
    z0 * std_dev
}
