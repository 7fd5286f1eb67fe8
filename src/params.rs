//! # Plugin Parameters
//!
//! The knobs and switches the host sees. Each parameter has a stable
//! string id (`#[id = "..."]`) the host uses to save and recall presets;
//! once published, never change these ids or existing sessions will load
//! with default values.
//!
//! ## No smoothing here
//!
//! Unlike a classic delay, none of these parameters carry a smoother. The
//! engine receives one snapshot per block (see
//! [`EchoformParams::to_engine_params()`]) and does its own click
//! suppression where a jump would be audible: the delay window crossfades
//! over 50 ms and scan-source changes glide. Everything else (mix,
//! feedback, character) is either already slow-moving or recirculates
//! through a `tanh`, so block-rate steps are inaudible.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::engine::params::{MAX_AUTO_SCAN_RATE_HZ, MAX_FEEDBACK, MIN_WINDOW_SECONDS};
use crate::engine::{BankRouting, BankSettings, EngineParams, FeedbackMode, StereoMode};

/// Longest delay window offered on the Time knob. The memory itself is
/// longer, so tape motion and spread can reach past the window.
pub const MAX_TIME_SECONDS: f32 = 30.0;

/// Longest tape window.
pub const MAX_TAPE_WINDOW_SECONDS: f32 = 30.0;

/// Spread range in either direction.
pub const MAX_SPREAD_SECONDS: f32 = 2.0;

#[derive(Params)]
pub struct EchoformParams {
    /// **Mix**: dry/wet balance. 0% is dry, 100% is only the read heads.
    #[id = "mix"]
    pub mix: FloatParam,

    /// **Time**: length of the delay window the heads scan across.
    ///
    /// Skewed so the first half of the knob covers roughly 50 ms to 4 s,
    /// where rhythmic delays live; the rest reaches out to 30 s loops.
    #[id = "time"]
    pub time: FloatParam,

    /// **Scan**: where in the window the heads read. 0% is the most recent
    /// audio, 100% the far end of the window.
    #[id = "scan"]
    pub scan: FloatParam,

    /// **Auto Scan**: sweep the heads automatically. 0 Hz hands control
    /// back to the Scan knob.
    #[id = "rate"]
    pub auto_scan_rate: FloatParam,

    /// **Spread**: offset of the second head. Negative values put it closer
    /// to "now" than the first.
    #[id = "sprd"]
    pub spread: FloatParam,

    /// **Feedback**: how much goes back into the memory. Capped at 99.5%;
    /// the `tanh` on the record path keeps even that bounded.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    #[id = "fbmode"]
    pub feedback_mode: EnumParam<FeedbackMode>,

    /// **Character**: one macro for the lo-fi chain. Smoothing, drift and
    /// wobble rise with it; dropouts only appear near the top of the range.
    #[id = "char"]
    pub character: FloatParam,

    #[id = "stereo"]
    pub stereo_mode: EnumParam<StereoMode>,

    /// **Seed**: the same seed from the same song position replays the
    /// same modulation.
    #[id = "seed"]
    pub seed: IntParam,

    /// Host-visible bypass. Whether the memory keeps playing depends on
    /// **Trails**.
    #[id = "bypass"]
    pub bypass: BoolParam,

    /// **Latch**: freeze the heads and stop recording new input.
    #[id = "latch"]
    pub latch: BoolParam,

    /// **Trails**: keep the memory audible while bypassed.
    #[id = "trails"]
    pub trails: BoolParam,

    /// **Wipe**: output only the wet signal and stop writing to the memory.
    #[id = "wipe"]
    pub wipe: BoolParam,

    /// **Always Record**: keep recording input while bypassed or latched.
    #[id = "alwrec"]
    pub always_record: BoolParam,

    /// **Tape**: let the heads wander on their own, holding for a few
    /// seconds and then sliding somewhere new.
    #[id = "tape"]
    pub tape_mode: BoolParam,

    #[id = "tapewin"]
    pub tape_window: FloatParam,

    #[nested(id_prefix = "a", group = "Bank A")]
    pub bank_a: BankParams,

    #[nested(id_prefix = "b", group = "Bank B")]
    pub bank_b: BankParams,
}

/// One modifier bank: where it sits, and how hard it shapes the signal.
#[derive(Params)]
pub struct BankParams {
    #[id = "route"]
    pub routing: EnumParam<BankRouting>,

    /// Level trim ahead of the drive, ±50%.
    #[id = "gain"]
    pub gain: FloatParam,

    #[id = "drive"]
    pub drive: FloatParam,

    /// Negative darkens, positive adds presence.
    #[id = "tone"]
    pub tone: FloatParam,
}

impl BankParams {
    fn new(routing: BankRouting) -> Self {
        Self {
            routing: EnumParam::new("Routing", routing),

            gain: FloatParam::new("Gain", 0.0, FloatRange::Linear { min: -1.0, max: 1.0 })
                .with_step_size(0.01),

            drive: FloatParam::new("Drive", 0.0, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(0))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            tone: FloatParam::new("Tone", 0.0, FloatRange::Linear { min: -1.0, max: 1.0 })
                .with_step_size(0.01),
        }
    }

    fn to_settings(&self) -> BankSettings {
        BankSettings {
            routing: self.routing.value(),
            gain: self.gain.value(),
            drive: self.drive.value(),
            tone: self.tone.value(),
        }
    }
}

impl Default for EchoformParams {
    fn default() -> Self {
        let defaults = EngineParams::DEFAULT;

        Self {
            mix: FloatParam::new("Mix", defaults.mix, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            time: FloatParam::new(
                "Time",
                defaults.time,
                FloatRange::Skewed {
                    min: MIN_WINDOW_SECONDS,
                    max: MAX_TIME_SECONDS,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" s")
            .with_step_size(0.001),

            scan: FloatParam::new("Scan", defaults.scan, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            auto_scan_rate: FloatParam::new(
                "Auto Scan",
                defaults.auto_scan_rate,
                FloatRange::Skewed {
                    min: 0.0,
                    max: MAX_AUTO_SCAN_RATE_HZ,
                    factor: FloatRange::skew_factor(-1.5),
                },
            )
            .with_value_to_string(Arc::new(|hz: f32| {
                if hz <= 0.0 {
                    String::from("Manual")
                } else {
                    format!("{hz:.2} Hz")
                }
            }))
            .with_step_size(0.01),

            spread: FloatParam::new(
                "Spread",
                defaults.spread,
                FloatRange::SymmetricalSkewed {
                    min: -MAX_SPREAD_SECONDS,
                    max: MAX_SPREAD_SECONDS,
                    factor: FloatRange::skew_factor(-1.0),
                    center: 0.0,
                },
            )
            .with_unit(" s")
            .with_step_size(0.001),

            feedback: FloatParam::new(
                "Feedback",
                defaults.feedback,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_FEEDBACK,
                },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            feedback_mode: EnumParam::new("Feedback Mode", defaults.feedback_mode),

            character: FloatParam::new(
                "Character",
                defaults.character,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            stereo_mode: EnumParam::new("Stereo", defaults.stereo_mode),

            seed: IntParam::new("Seed", defaults.seed as i32, IntRange::Linear { min: 0, max: 9999 }),

            bypass: BoolParam::new("Bypass", defaults.bypass).make_bypass(),
            latch: BoolParam::new("Latch", defaults.latch),
            trails: BoolParam::new("Trails", defaults.trails),
            wipe: BoolParam::new("Wipe", defaults.wipe),
            always_record: BoolParam::new("Always Record", defaults.always_record),
            tape_mode: BoolParam::new("Tape", defaults.tape_mode),

            tape_window: FloatParam::new(
                "Tape Window",
                defaults.tape_window,
                FloatRange::Skewed {
                    min: MIN_WINDOW_SECONDS,
                    max: MAX_TAPE_WINDOW_SECONDS,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_unit(" s")
            .with_step_size(0.001),

            bank_a: BankParams::new(defaults.bank_a.routing),
            bank_b: BankParams::new(defaults.bank_b.routing),
        }
    }
}

impl EchoformParams {
    /// Snapshot the current values for one audio block.
    pub fn to_engine_params(&self) -> EngineParams {
        EngineParams {
            mix: self.mix.value(),
            scan: self.scan.value(),
            auto_scan_rate: self.auto_scan_rate.value(),
            spread: self.spread.value(),
            feedback: self.feedback.value(),
            time: self.time.value(),
            character: self.character.value(),
            stereo_mode: self.stereo_mode.value(),
            feedback_mode: self.feedback_mode.value(),
            seed: self.seed.value().max(0) as u32,
            bypass: self.bypass.value(),
            latch: self.latch.value(),
            trails: self.trails.value(),
            wipe: self.wipe.value(),
            always_record: self.always_record.value(),
            tape_mode: self.tape_mode.value(),
            tape_window: self.tape_window.value(),
            bank_a: self.bank_a.to_settings(),
            bank_b: self.bank_b.to_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let params = EchoformParams::default();
        assert_eq!(params.to_engine_params(), EngineParams::default());
    }

    #[test]
    fn test_parameter_ids_are_unique() {
        let params = EchoformParams::default();
        let mut ids: Vec<String> = params.param_map().into_iter().map(|(id, _, _)| id).collect();
        let count = ids.len();

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert!(ids.contains(&String::from("a_route")));
        assert!(ids.contains(&String::from("a_gain")));
        assert!(ids.contains(&String::from("b_tone")));
    }
}
