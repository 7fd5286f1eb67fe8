//! # Lo-fi Modifiers
//!
//! Four small effects that make the memory sound like a worn tape loop
//! rather than a pristine digital buffer:
//!
//! | Modifier       | What it does                                        |
//! |----------------|-----------------------------------------------------|
//! | [`Smoothing`]  | one-pole lowpass, darker as intensity rises         |
//! | [`PitchDrift`] | slow random pitch wander (short modulated delay)    |
//! | [`Wobble`]     | wow + flutter LFOs on a short modulated delay       |
//! | [`Dropout`]    | random short gain dips                              |
//!
//! They always run in that order inside a [`ModifierChain`] and are all
//! driven by one "character" macro through fixed, deliberately nonlinear
//! curves, so low character settings stay close to transparent.
//!
//! ## Stereo coupling
//!
//! `process_sample` is called once per channel per frame. Modulation
//! (LFO position, drift ramp, dropout trigger) is computed when
//! `channel == 0` and held for channel 1; cursors and counters advance on
//! the last channel. Left and right therefore wobble together and a dropout
//! hits both sides at once.
//!
//! ## Determinism
//!
//! The only source of randomness is the [`RandomGenerator`] passed in. No
//! modifier reads clocks or thread state.

use std::f32::consts::TAU;

use super::delay_line::DelayLine;
use super::filter::OnePoleFilter;
use super::random::RandomGenerator;

/// The engine always processes a stereo pair.
const CHANNELS: usize = 2;
const LAST_CHANNEL: usize = CHANNELS - 1;

/// Below this intensity a modifier returns its input untouched.
const BYPASS_INTENSITY: f32 = 0.0001;

mod sealed {
    pub trait Sealed {}
}

/// The capability set shared by every modifier.
///
/// Sealed: the chain composition is fixed, so there is nothing for outside
/// code to implement.
pub trait Modifier: sealed::Sealed {
    /// Size internal state for `sample_rate`. Allocates; never call from
    /// the audio thread.
    fn prepare(&mut self, sample_rate: f32);

    /// Clear internal state without reallocating.
    fn reset(&mut self);

    /// Rewind the modulation (LFO phases, random ramps, pending dropouts)
    /// to where a freshly reset modifier starts. Signal history is kept.
    fn reset_modulation(&mut self) {}

    /// Set the effect amount, clamped to `[0, 1]`.
    fn set_intensity(&mut self, intensity: f32);

    fn intensity(&self) -> f32;

    fn process_sample(&mut self, input: f32, channel: usize, rng: &mut RandomGenerator) -> f32;
}

#[inline]
fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Linear map of `t` in `[0, 1]` onto `[from, to]`.
#[inline]
fn map_range(t: f32, from: f32, to: f32) -> f32 {
    from + (to - from) * t
}

// ─────────────────────────────────────────────────────────────────────
// Smoothing
// ─────────────────────────────────────────────────────────────────────

/// One-pole lowpass per channel; cutoff falls from 16 kHz to 400 Hz as
/// intensity rises.
#[derive(Debug)]
pub struct Smoothing {
    intensity: f32,
    sample_rate: f32,
    filters: [OnePoleFilter; CHANNELS],
}

impl Smoothing {
    const MAX_CUTOFF_HZ: f32 = 16000.0;
    const MIN_CUTOFF_HZ: f32 = 400.0;

    pub fn new() -> Self {
        Self {
            intensity: 0.0,
            sample_rate: 44100.0,
            filters: [OnePoleFilter::new(), OnePoleFilter::new()],
        }
    }

    fn update_cutoff(&mut self) {
        let cutoff = map_range(self.intensity, Self::MAX_CUTOFF_HZ, Self::MIN_CUTOFF_HZ);
        for filter in &mut self.filters {
            filter.set_cutoff(cutoff, self.sample_rate);
        }
    }
}

impl sealed::Sealed for Smoothing {}

impl Modifier for Smoothing {
    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_cutoff();
        self.reset();
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = clamp_unit(intensity);
        self.update_cutoff();
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn process_sample(&mut self, input: f32, channel: usize, _rng: &mut RandomGenerator) -> f32 {
        if self.intensity <= BYPASS_INTENSITY {
            return input;
        }
        self.filters[channel.min(LAST_CHANNEL)].process(input)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Pitch drift
// ─────────────────────────────────────────────────────────────────────

/// Wandering pitch: every 0.6 s a new random delay target is drawn and the
/// read position ramps towards it linearly. A moving read position is a
/// pitch shift, so the result is a slow, irregular detune.
#[derive(Debug)]
pub struct PitchDrift {
    intensity: f32,
    sample_rate: f32,
    line: DelayLine,
    current_ms: f32,
    step_ms: f32,
    samples_remaining: u32,
    delay_samples: f32,
}

impl PitchDrift {
    const LINE_MS: f32 = 8.0;
    const BASE_DELAY_MS: f32 = 3.0;
    const MAX_DEPTH_MS: f32 = 2.2;
    const RETARGET_SECONDS: f32 = 0.6;

    pub fn new() -> Self {
        Self {
            intensity: 0.0,
            sample_rate: 44100.0,
            line: DelayLine::default(),
            current_ms: 0.0,
            step_ms: 0.0,
            samples_remaining: 0,
            delay_samples: 0.0,
        }
    }
}

impl sealed::Sealed for PitchDrift {}

impl Modifier for PitchDrift {
    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.line.prepare(sample_rate, Self::LINE_MS);
        self.reset();
    }

    fn reset(&mut self) {
        self.line.clear();
        self.reset_modulation();
    }

    fn reset_modulation(&mut self) {
        self.current_ms = 0.0;
        self.step_ms = 0.0;
        self.samples_remaining = 0;
        self.delay_samples = 0.0;
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = clamp_unit(intensity);
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn process_sample(&mut self, input: f32, channel: usize, rng: &mut RandomGenerator) -> f32 {
        if self.intensity <= BYPASS_INTENSITY {
            return input;
        }

        if channel == 0 {
            if self.samples_remaining == 0 {
                let depth_ms = map_range(self.intensity, 0.0, Self::MAX_DEPTH_MS);
                let target_ms = rng.next_float_signed() * depth_ms;
                let ramp = ((self.sample_rate * Self::RETARGET_SECONDS) as u32).max(1);
                self.step_ms = (target_ms - self.current_ms) / ramp as f32;
                self.samples_remaining = ramp;
            }

            self.current_ms += self.step_ms;
            self.samples_remaining -= 1;
            self.delay_samples = (Self::BASE_DELAY_MS + self.current_ms) * self.sample_rate / 1000.0;
        }

        let delayed = self.line.read(channel, self.delay_samples);
        self.line.write(channel, input);
        if channel >= LAST_CHANNEL {
            self.line.advance();
        }

        input + (delayed - input) * self.intensity
    }
}

// ─────────────────────────────────────────────────────────────────────
// Wobble
// ─────────────────────────────────────────────────────────────────────

/// Wow and flutter: a slow and a fast sine LFO, summed 70/30, swing the
/// read position of a short delay line. Rates and depth grow with
/// intensity.
#[derive(Debug)]
pub struct Wobble {
    intensity: f32,
    sample_rate: f32,
    line: DelayLine,
    wow_phase: f32,
    flutter_phase: f32,
    wow_step: f32,
    flutter_step: f32,
    depth_ms: f32,
    base_delay_ms: f32,
    delay_samples: f32,
}

impl Wobble {
    const LINE_MS: f32 = 12.0;
    const MIN_BASE_DELAY_MS: f32 = 4.0;
    const MAX_DEPTH_MS: f32 = 3.5;
    const WOW_RATE_HZ: (f32, f32) = (0.05, 0.6);
    const FLUTTER_RATE_HZ: (f32, f32) = (1.8, 6.5);
    const WOW_WEIGHT: f32 = 0.7;
    const FLUTTER_WEIGHT: f32 = 0.3;

    pub fn new() -> Self {
        Self {
            intensity: 0.0,
            sample_rate: 44100.0,
            line: DelayLine::default(),
            wow_phase: 0.0,
            flutter_phase: 0.0,
            wow_step: 0.0,
            flutter_step: 0.0,
            depth_ms: 0.0,
            base_delay_ms: Self::MIN_BASE_DELAY_MS,
            delay_samples: 0.0,
        }
    }

    fn update_rates(&mut self) {
        let wow_hz = map_range(self.intensity, Self::WOW_RATE_HZ.0, Self::WOW_RATE_HZ.1);
        let flutter_hz = map_range(self.intensity, Self::FLUTTER_RATE_HZ.0, Self::FLUTTER_RATE_HZ.1);
        self.depth_ms = map_range(self.intensity, 0.0, Self::MAX_DEPTH_MS);
        self.base_delay_ms = Self::MIN_BASE_DELAY_MS + self.depth_ms;

        if self.sample_rate > 0.0 {
            self.wow_step = TAU * wow_hz / self.sample_rate;
            self.flutter_step = TAU * flutter_hz / self.sample_rate;
        }
    }
}

impl sealed::Sealed for Wobble {}

impl Modifier for Wobble {
    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.line.prepare(sample_rate, Self::LINE_MS);
        self.update_rates();
        self.reset();
    }

    fn reset(&mut self) {
        self.line.clear();
        self.reset_modulation();
    }

    fn reset_modulation(&mut self) {
        self.wow_phase = 0.0;
        self.flutter_phase = 0.0;
        self.delay_samples = 0.0;
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = clamp_unit(intensity);
        self.update_rates();
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn process_sample(&mut self, input: f32, channel: usize, _rng: &mut RandomGenerator) -> f32 {
        if self.intensity <= BYPASS_INTENSITY {
            return input;
        }

        if channel == 0 {
            let swing = self.wow_phase.sin() * Self::WOW_WEIGHT
                + self.flutter_phase.sin() * Self::FLUTTER_WEIGHT;
            let delay_ms = self.base_delay_ms + swing * self.depth_ms;
            self.delay_samples = delay_ms * self.sample_rate / 1000.0;
        }

        let delayed = self.line.read(channel, self.delay_samples);
        self.line.write(channel, input);

        if channel >= LAST_CHANNEL {
            self.line.advance();
            self.wow_phase += self.wow_step;
            self.flutter_phase += self.flutter_step;
            if self.wow_phase > TAU {
                self.wow_phase -= TAU;
            }
            if self.flutter_phase > TAU {
                self.flutter_phase -= TAU;
            }
        }

        input + (delayed - input) * self.intensity
    }
}

// ─────────────────────────────────────────────────────────────────────
// Dropout
// ─────────────────────────────────────────────────────────────────────

/// Random level dips. Each frame outside a dropout rolls against a small
/// probability; a hit ducks the signal for 10–80 ms.
#[derive(Debug)]
pub struct Dropout {
    intensity: f32,
    sample_rate: f32,
    samples_remaining: u32,
    gain: f32,
}

impl Dropout {
    const MAX_PROBABILITY: f32 = 0.0006;
    const LENGTH_SECONDS: (f32, f32) = (0.01, 0.08);
    /// Gain during a dropout at intensity 1. Intensity 0 would be unity.
    const DEEPEST_GAIN: f32 = 0.2;

    pub fn new() -> Self {
        Self {
            intensity: 0.0,
            sample_rate: 44100.0,
            samples_remaining: 0,
            gain: 1.0,
        }
    }
}

impl sealed::Sealed for Dropout {}

impl Modifier for Dropout {
    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    fn reset(&mut self) {
        self.reset_modulation();
    }

    fn reset_modulation(&mut self) {
        self.samples_remaining = 0;
        self.gain = 1.0;
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = clamp_unit(intensity);
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn process_sample(&mut self, input: f32, channel: usize, rng: &mut RandomGenerator) -> f32 {
        if self.intensity <= BYPASS_INTENSITY {
            return input;
        }

        if channel == 0 && self.samples_remaining == 0 {
            let probability = map_range(self.intensity, 0.0, Self::MAX_PROBABILITY);
            if rng.next_float01() < probability {
                let seconds = rng.next_float_range(Self::LENGTH_SECONDS.0, Self::LENGTH_SECONDS.1);
                self.samples_remaining = ((self.sample_rate * seconds) as u32).max(1);
                self.gain = map_range(self.intensity, 1.0, Self::DEEPEST_GAIN);
            }
        }

        let output = if self.samples_remaining > 0 {
            input * self.gain
        } else {
            input
        };

        if channel >= LAST_CHANNEL && self.samples_remaining > 0 {
            self.samples_remaining -= 1;
        }

        output
    }
}

// ─────────────────────────────────────────────────────────────────────
// Chain
// ─────────────────────────────────────────────────────────────────────

/// The four modifiers in their fixed order:
/// smoothing → pitch drift → wobble → dropout.
#[derive(Debug)]
pub struct ModifierChain {
    smoothing: Smoothing,
    pitch_drift: PitchDrift,
    wobble: Wobble,
    dropout: Dropout,
    character: f32,
}

impl Default for ModifierChain {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::new(),
            pitch_drift: PitchDrift::new(),
            wobble: Wobble::new(),
            dropout: Dropout::new(),
            character: 0.0,
        }
    }
}

impl ModifierChain {
    pub fn prepare(&mut self, sample_rate: f32) {
        self.smoothing.prepare(sample_rate);
        self.pitch_drift.prepare(sample_rate);
        self.wobble.prepare(sample_rate);
        self.dropout.prepare(sample_rate);
    }

    pub fn reset(&mut self) {
        self.smoothing.reset();
        self.pitch_drift.reset();
        self.wobble.reset();
        self.dropout.reset();
    }

    /// Restart every modulation source while the short delay lines and
    /// filters keep their contents.
    pub fn reset_modulation(&mut self) {
        self.smoothing.reset_modulation();
        self.pitch_drift.reset_modulation();
        self.wobble.reset_modulation();
        self.dropout.reset_modulation();
    }

    /// Drive all four intensities from one macro value:
    ///
    /// ```text
    /// smoothing   = c * 0.9
    /// pitch drift = c * 0.6
    /// wobble      = c
    /// dropout     = c²
    /// ```
    pub fn set_character(&mut self, character: f32) {
        let c = clamp_unit(character);
        if c == self.character {
            return;
        }
        self.character = c;
        self.smoothing.set_intensity(c * 0.9);
        self.pitch_drift.set_intensity(c * 0.6);
        self.wobble.set_intensity(c);
        self.dropout.set_intensity(c * c);
    }

    pub fn character(&self) -> f32 {
        self.character
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32, channel: usize, rng: &mut RandomGenerator) -> f32 {
        let mut output = input;
        output = self.smoothing.process_sample(output, channel, rng);
        output = self.pitch_drift.process_sample(output, channel, rng);
        output = self.wobble.process_sample(output, channel, rng);
        self.dropout.process_sample(output, channel, rng)
    }

    /// Convenience for one stereo frame: left then right.
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32, rng: &mut RandomGenerator) -> (f32, f32) {
        let left = self.process_sample(left, 0, rng);
        let right = self.process_sample(right, 1, rng);
        (left, right)
    }
}
