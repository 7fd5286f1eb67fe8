//! Block-rate parameter snapshot for the memory delay engine.
//!
//! The plugin shell builds one [`EngineParams`] per audio block from the
//! host's automation values and hands it to
//! [`MemoryDelayEngine::set_parameters`](super::MemoryDelayEngine::set_parameters).
//! Nothing here is smoothed; the engine does its own crossfading where a
//! jump would be audible.

use nih_plug::prelude::Enum;

/// Shortest delay window. Anything smaller stops sounding like a delay.
pub const MIN_WINDOW_SECONDS: f32 = 0.05;

/// Feedback ceiling. Kept below 1.0 so the loop decays even before the
/// `tanh` in the record path gets involved.
pub const MAX_FEEDBACK: f32 = 0.995;

/// Fastest auto-scan sweep.
pub const MAX_AUTO_SCAN_RATE_HZ: f32 = 10.0;

/// How left and right map onto the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum StereoMode {
    /// Left reads left, right reads right.
    #[name = "Independent"]
    Independent,
    /// Both sides read the left channel; the record path writes a mono
    /// downmix.
    #[name = "Linked"]
    Linked,
    /// Left reads right and right reads left (ping-pong).
    #[name = "Cross"]
    Cross,
}

/// Which stage of the signal goes back into the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum FeedbackMode {
    /// Nothing is recirculated; the existing memory decays by
    /// [`COLLECT_DECAY`](super::COLLECT_DECAY) and new input is layered on
    /// top.
    #[name = "Collect"]
    Collect,
    /// The post-modifier wet read is recirculated; the dry path is not.
    #[name = "Feed"]
    Feed,
    /// The full mixed output is recirculated, so modifiers and dry signal
    /// both compound on every pass.
    #[name = "Closed"]
    Closed,
}

/// Where a modifier bank sits in the signal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum BankRouting {
    #[name = "Off"]
    Off,
    /// Colors the dry input on its way into the memory.
    #[name = "In"]
    In,
    /// Colors what the read heads play back.
    #[name = "Out"]
    Out,
    /// Colors only the recirculated signal.
    #[name = "Feed"]
    Feed,
}

/// Settings for one modifier bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankSettings {
    pub routing: BankRouting,
    /// Level trim in `[-1, 1]`, applied as `1 + gain * 0.5` before the
    /// drive stage; 0 is unity.
    pub gain: f32,
    /// Saturation amount in `[0, 1]`; 0 is clean.
    pub drive: f32,
    /// Tilt in `[-1, 1]`; negative darkens, positive adds presence, 0 is
    /// flat.
    pub tone: f32,
}

impl BankSettings {
    pub const fn off() -> Self {
        Self {
            routing: BankRouting::Off,
            gain: 0.0,
            drive: 0.0,
            tone: 0.0,
        }
    }

    pub const fn routed(routing: BankRouting) -> Self {
        Self {
            routing,
            gain: 0.0,
            drive: 0.0,
            tone: 0.0,
        }
    }

    pub(crate) fn sanitized(self) -> Self {
        Self {
            routing: self.routing,
            gain: clamp_or(self.gain, -1.0, 1.0, 0.0),
            drive: clamp_or(self.drive, 0.0, 1.0, 0.0),
            tone: clamp_or(self.tone, -1.0, 1.0, 0.0),
        }
    }
}

/// Every engine parameter, replaced wholesale once per block.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineParams {
    /// Dry/wet balance in `[0, 1]`.
    pub mix: f32,
    /// Manual scan position in `[0, 1]`.
    pub scan: f32,
    /// Auto-scan sweep rate in Hz; 0 selects manual scanning.
    pub auto_scan_rate: f32,
    /// Secondary head offset in seconds, may be negative.
    pub spread: f32,
    /// Recirculation amount in `[0, MAX_FEEDBACK]`.
    pub feedback: f32,
    /// Delay window in seconds, clamped to `[MIN_WINDOW_SECONDS, capacity]`.
    pub time: f32,
    /// Lo-fi macro in `[0, 1]`.
    pub character: f32,
    pub stereo_mode: StereoMode,
    pub feedback_mode: FeedbackMode,
    pub seed: u32,
    pub bypass: bool,
    pub latch: bool,
    pub trails: bool,
    pub wipe: bool,
    pub always_record: bool,
    pub tape_mode: bool,
    /// Portion of the memory, in seconds, that tape motion wanders over.
    pub tape_window: f32,
    pub bank_a: BankSettings,
    pub bank_b: BankSettings,
}

impl EngineParams {
    /// The power-on state. Setters fall back to these values when handed
    /// NaN or infinity.
    pub const DEFAULT: Self = Self {
        mix: 0.5,
        scan: 0.0,
        auto_scan_rate: 0.0,
        spread: 0.0,
        feedback: 0.35,
        time: 2.0,
        character: 0.0,
        stereo_mode: StereoMode::Independent,
        feedback_mode: FeedbackMode::Feed,
        seed: 0,
        bypass: false,
        latch: false,
        trails: false,
        wipe: false,
        always_record: false,
        tape_mode: false,
        tape_window: 4.0,
        bank_a: BankSettings::routed(BankRouting::Out),
        bank_b: BankSettings::off(),
    };
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Clamp `value` into `[min, max]`, substituting `fallback` for NaN and
/// infinities.
#[inline]
pub(crate) fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}
