//! Routable modifier banks.
//!
//! A bank is one [`ModifierChain`] followed by a shaping stage (gain trim,
//! drive, tone tilt), inserted at one point of the signal path (see
//! [`BankRouting`]). The engine owns two banks, so the same lo-fi character
//! can for example color the playback (`Out`) while a second, driven copy
//! darkens only the recirculation (`Feed`).

use crate::dsp::filter::OnePoleFilter;
use crate::dsp::modifiers::ModifierChain;
use crate::dsp::random::RandomGenerator;

use super::params::{BankRouting, BankSettings};

/// Gain, drive and tone below this magnitude are treated as off.
const NEUTRAL_EPSILON: f32 = 1.0e-4;

/// Darkest cutoff reached at tone = -1.
const DARK_CUTOFF_HZ: f32 = 600.0;
/// Cutoff at a tone just below zero.
const OPEN_CUTOFF_HZ: f32 = 16000.0;
/// Split point for the presence boost at positive tone.
const PRESENCE_CUTOFF_HZ: f32 = 2000.0;

#[derive(Debug)]
pub struct ModifierBank {
    settings: BankSettings,
    chain: ModifierChain,
    tone_filters: [OnePoleFilter; 2],
    sample_rate: f32,
}

impl Default for ModifierBank {
    fn default() -> Self {
        Self {
            settings: BankSettings::off(),
            chain: ModifierChain::default(),
            tone_filters: [OnePoleFilter::new(), OnePoleFilter::new()],
            sample_rate: 44100.0,
        }
    }
}

impl ModifierBank {
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.chain.prepare(sample_rate);
        self.update_tone();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.chain.reset();
        for filter in &mut self.tone_filters {
            filter.reset();
        }
    }

    /// Restart the chain's modulation after a transport reseed. Filter and
    /// delay-line contents stay.
    pub fn reset_modulation(&mut self) {
        self.chain.reset_modulation();
    }

    pub fn routing(&self) -> BankRouting {
        self.settings.routing
    }

    pub fn settings(&self) -> BankSettings {
        self.settings
    }

    #[inline]
    pub fn is_routed(&self, routing: BankRouting) -> bool {
        self.settings.routing == routing
    }

    pub fn set_settings(&mut self, settings: BankSettings) {
        let settings = settings.sanitized();
        let tone_changed = settings.tone != self.settings.tone;
        self.settings = settings;
        if tone_changed {
            self.update_tone();
        }
    }

    pub fn set_character(&mut self, character: f32) {
        self.chain.set_character(character);
    }

    /// Run one stereo frame through chain, gain, drive and tone.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32, rng: &mut RandomGenerator) -> (f32, f32) {
        let (left, right) = self.chain.process_frame(left, right, rng);
        let left = self.shape(left, 0);
        let right = self.shape(right, 1);
        (left, right)
    }

    #[inline]
    fn shape(&mut self, input: f32, channel: usize) -> f32 {
        let mut value = input;

        let gain = self.settings.gain;
        if gain.abs() > NEUTRAL_EPSILON {
            value *= 1.0 + gain * 0.5;
        }

        let drive = self.settings.drive;
        if drive > NEUTRAL_EPSILON {
            // Normalized so a full-scale input still peaks at full scale.
            let amount = 1.0 + drive * 2.0;
            value = (value * amount).tanh() / amount.tanh();
        }

        let tone = self.settings.tone;
        if tone < -NEUTRAL_EPSILON {
            value = self.tone_filters[channel].process(value);
        } else if tone > NEUTRAL_EPSILON {
            let low = self.tone_filters[channel].process(value);
            value += tone * (value - low);
        }

        value
    }

    fn update_tone(&mut self) {
        let tone = self.settings.tone;
        let cutoff = if tone < 0.0 {
            OPEN_CUTOFF_HZ + (DARK_CUTOFF_HZ - OPEN_CUTOFF_HZ) * -tone
        } else {
            PRESENCE_CUTOFF_HZ
        };
        for filter in &mut self.tone_filters {
            filter.set_cutoff(cutoff, self.sample_rate);
        }
    }
}
