use chrono::{NaiveDateTime, Timelike};
use rand::{SeedableRng, rngs::StdRng};

use super::types::{ConsumptionProbe, gaussian_noise};

/// A synthetic meter that models an appliance's daily demand pattern.
///
/// `SyntheticProbe` produces a sinusoidal power draw over the day with a
/// configurable baseline, amplitude, phase, and Gaussian noise, and integrates
/// it over the sampled period.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use outlet_shed::devices::{ConsumptionProbe, SyntheticProbe};
///
/// let mut heater = SyntheticProbe::new(
///     2.0,  // base_kw - average draw
///     0.5,  // amp_kw - daily variation
///     0.0,  // phase_rad
///     0.0,  // noise_std
///     42,   // seed
/// );
/// let noon = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
/// let kwh = heater.sample(noon, 0.25, 1.0);
/// assert!(kwh > 0.0);
/// assert_eq!(heater.sample(noon, 0.25, 0.0), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct SyntheticProbe {
    /// Baseline power draw in kilowatts
    pub base_kw: f32,

    /// Amplitude of the sinusoidal variation in kilowatts
    pub amp_kw: f32,

    /// Phase offset of the sinusoidal pattern in radians
    pub phase_rad: f32,

    /// Standard deviation of the Gaussian noise in kilowatts
    pub noise_std: f32,

    rng: StdRng,
}

impl SyntheticProbe {
    /// Creates a new synthetic meter.
    ///
    /// # Arguments
    ///
    /// * `base_kw` - The baseline power draw in kilowatts
    /// * `amp_kw` - The amplitude of sinusoidal daily variation in kilowatts
    /// * `phase_rad` - The phase offset in radians (0 = minimum at start of day)
    /// * `noise_std` - The standard deviation of Gaussian noise in kilowatts
    /// * `seed` - Random seed for reproducible noise generation
    pub fn new(base_kw: f32, amp_kw: f32, phase_rad: f32, noise_std: f32, seed: u64) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Instantaneous full-power draw at `at`, never negative.
    pub fn demand_kw(&mut self, at: NaiveDateTime) -> f32 {
        let day_pos = at.num_seconds_from_midnight() as f32 / 86_400.0; // [0,1)
        let angle = 2.0 * std::f32::consts::PI * day_pos + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);
        (self.base_kw + self.amp_kw * angle.sin() + noise).max(0.0)
    }
}

impl ConsumptionProbe for SyntheticProbe {
    fn sample(&mut self, at: NaiveDateTime, hours: f32, output_level: f32) -> f32 {
        if output_level <= 0.0 || hours <= 0.0 {
            return 0.0;
        }
        self.demand_kw(at) * output_level.min(1.0) * hours
    }
}
