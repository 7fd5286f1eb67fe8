//! # One-Pole Lowpass Filter
//!
//! The smallest useful IIR filter, and the workhorse of the plugin's tone
//! shaping: the "smoothing" modifier uses one per channel to darken the
//! memory as character rises, and each modifier bank uses one for its tone
//! control.
//!
//! ```text
//! y[n] = (1 - a) * x[n] + a * y[n-1]
//! a    = e^(-2π * cutoff_hz / sample_rate)
//! ```
//!
//! `a = 0` passes the input untouched; `a → 1` freezes the output. The
//! slope is a gentle 6 dB/octave, close to the high-frequency loss of a
//! worn tape path.

use std::f32::consts::PI;

/// Lowest cutoff accepted by [`OnePoleFilter::set_cutoff`].
const MIN_CUTOFF_HZ: f32 = 20.0;

/// A one-pole (6 dB/octave) lowpass filter.
#[derive(Debug, Clone, Default)]
pub struct OnePoleFilter {
    /// 0.0 (no filtering) up to just below 1.0 (extreme filtering).
    coefficient: f32,
    prev_output: f32,
}

impl OnePoleFilter {
    /// A filter that starts as a passthrough.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the coefficient for `cutoff_hz` at `sample_rate`.
    ///
    /// The cutoff is kept between 20 Hz and 49 % of the sample rate. At very
    /// low sample rates the Nyquist guard wins over the 20 Hz floor.
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            self.coefficient = 0.0;
            return;
        }

        let safe_cutoff = cutoff_hz.max(MIN_CUTOFF_HZ).min(sample_rate * 0.49);
        self.coefficient = (-2.0 * PI * safe_cutoff / sample_rate).exp();
    }

    /// Run one sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = (1.0 - self.coefficient) * input + self.coefficient * self.prev_output;
        self.prev_output = output;
        output
    }

    /// Forget the previous output.
    pub fn reset(&mut self) {
        self.prev_output = 0.0;
    }
}
