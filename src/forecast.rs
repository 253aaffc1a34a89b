//! Consumption forecasting from a rolling window of per-cycle samples.

use std::collections::VecDeque;

/// Default window length: 28 six-hour cycles, i.e. one week of history.
pub const DEFAULT_HISTORY_SLOTS: usize = 28;

/// Rolling-history forecaster with linearly increasing sample weights.
///
/// The window always holds exactly `capacity` slots. It starts zero-filled,
/// so a node that has never been observed drawing power forecasts zero.
/// New samples are pushed at the tail and the oldest slot is dropped.
///
/// # Examples
///
/// ```
/// use outlet_shed::forecast::HistoryForecaster;
///
/// let mut history = HistoryForecaster::new(4);
/// history.record(10.0, true);
/// history.record(10.0, true);
/// history.record(10.0, true);
/// history.record(10.0, true);
/// assert!((history.forecast_next_interval() - 10.0).abs() < 1e-5);
/// ```
#[derive(Debug, Clone)]
pub struct HistoryForecaster {
    window: VecDeque<f32>,
    weights: Vec<f32>,
}

impl HistoryForecaster {
    /// Creates a zero-filled forecaster with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be > 0");
        Self {
            window: std::iter::repeat_n(0.0, capacity).collect(),
            weights: Self::weights(capacity),
        }
    }

    /// Normalized weights `(i + 1) / (1 + 2 + ... + n)`, oldest first.
    pub fn weights(n: usize) -> Vec<f32> {
        let total = (n * (n + 1) / 2) as f32;
        (0..n).map(|i| (i + 1) as f32 / total).collect()
    }

    /// Records the energy drawn during the last interval.
    ///
    /// Intervals where the outlet was never powered leave the window untouched,
    /// so off periods do not drag the forecast towards zero. Negative or
    /// non-finite readings are clamped to zero.
    pub fn record(&mut self, sample_kwh: f32, powered: bool) {
        if !powered {
            return;
        }
        let sample = if sample_kwh.is_finite() {
            sample_kwh.max(0.0)
        } else {
            0.0
        };
        self.window.pop_front();
        self.window.push_back(sample);
    }

    /// Weighted average of the window: the expected energy of the next interval.
    pub fn forecast_next_interval(&self) -> f32 {
        self.window
            .iter()
            .zip(&self.weights)
            .map(|(sample, weight)| sample * weight)
            .sum()
    }

    /// Linear extrapolation of the next-interval forecast across the cycles left in the month.
    pub fn forecast_to_month_end(&self, remaining_cycles: u32) -> f32 {
        self.forecast_next_interval() * remaining_cycles as f32
    }

    /// Window contents, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.window.iter().copied()
    }

    /// Number of slots in the window.
    pub fn capacity(&self) -> usize {
        self.weights.len()
    }
}

impl Default for HistoryForecaster {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SLOTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_and_increase() {
        let w = HistoryForecaster::weights(28);
        let sum: f32 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(w.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn empty_history_forecasts_zero() {
        let history = HistoryForecaster::default();
        assert_eq!(history.forecast_next_interval(), 0.0);
        assert_eq!(history.forecast_to_month_end(100), 0.0);
    }

    #[test]
    fn forecast_stays_within_sample_bounds() {
        let mut history = HistoryForecaster::new(6);
        let samples = [3.0, 9.5, 1.25, 7.0, 4.0, 8.0, 2.0, 6.5];
        for s in samples {
            history.record(s, true);
        }
        let window: Vec<f32> = history.samples().collect();
        let min = window.iter().copied().fold(f32::INFINITY, f32::min);
        let max = window.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let forecast = history.forecast_next_interval();
        assert!(forecast >= min - 1e-5 && forecast <= max + 1e-5);
    }

    #[test]
    fn recent_samples_weigh_more() {
        let mut rising = HistoryForecaster::new(4);
        for s in [0.0, 0.0, 0.0, 10.0] {
            rising.record(s, true);
        }
        let mut falling = HistoryForecaster::new(4);
        for s in [10.0, 0.0, 0.0, 0.0] {
            falling.record(s, true);
        }
        assert!(rising.forecast_next_interval() > falling.forecast_next_interval());
        // newest slot weight is 4/10
        assert!((rising.forecast_next_interval() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn unpowered_interval_does_not_shift_window() {
        let mut history = HistoryForecaster::new(3);
        history.record(5.0, true);
        let before: Vec<f32> = history.samples().collect();
        history.record(0.0, false);
        let after: Vec<f32> = history.samples().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn month_end_forecast_scales_linearly() {
        let mut history = HistoryForecaster::new(2);
        history.record(3.0, true);
        history.record(3.0, true);
        assert!((history.forecast_to_month_end(10) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn negative_samples_are_clamped() {
        let mut history = HistoryForecaster::new(1);
        history.record(-4.0, true);
        assert_eq!(history.forecast_next_interval(), 0.0);
    }
}
