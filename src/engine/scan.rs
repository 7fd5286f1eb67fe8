//! Scan automation and the two smoothers that keep it click-free.
//!
//! - [`AutoScan`] sweeps the read position in a triangle from 0 up to a
//!   random depth and back, drawing a new depth every cycle.
//! - [`ScanGlide`] bridges the jump when the scan source changes (manual to
//!   auto, auto to tape, a new auto rate, ...).
//! - [`WindowCrossfade`] blends two delay-window lengths while the window
//!   parameter changes, instead of yanking the heads to a new position.

use crate::dsp::random::RandomGenerator;

/// Length of a scan-source glide.
pub const SCAN_GLIDE_SECONDS: f32 = 0.05;

/// Length of a delay-window crossfade.
pub const WINDOW_CROSSFADE_SECONDS: f32 = 0.05;

/// Window changes smaller than this are ignored.
const WINDOW_EPSILON: f32 = 1.0e-6;

/// Number of samples in `seconds`, at least one.
#[inline]
pub fn ramp_samples(seconds: f32, sample_rate: f32) -> u32 {
    let samples = seconds * sample_rate;
    if samples.is_finite() && samples > 1.0 {
        samples as u32
    } else {
        1
    }
}

/// Triangle sweep between 0 and a freshly drawn target each cycle.
#[derive(Debug, Clone)]
pub struct AutoScan {
    /// Position in the current cycle, `[0, 1)`.
    phase: f64,
    target: f32,
    needs_target: bool,
}

impl Default for AutoScan {
    fn default() -> Self {
        Self {
            phase: 0.0,
            target: 0.0,
            needs_target: true,
        }
    }
}

impl AutoScan {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Depth of the current cycle.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Advance one sample and return the normalized scan offset.
    ///
    /// The triangle is 0 at both ends of a cycle, so swapping the target at
    /// the cycle boundary never causes a jump.
    pub fn next(&mut self, rate_hz: f32, sample_rate: f32, rng: &mut RandomGenerator) -> f32 {
        if self.needs_target {
            self.target = rng.next_float01();
            self.needs_target = false;
        }

        let triangle = if self.phase < 0.5 {
            self.phase * 2.0
        } else {
            2.0 - self.phase * 2.0
        };
        let offset = triangle as f32 * self.target;

        if sample_rate > 0.0 {
            self.phase += f64::from(rate_hz.max(0.0)) / f64::from(sample_rate);
        }
        if self.phase >= 1.0 {
            self.phase = self.phase.fract();
            self.needs_target = true;
        }

        offset
    }
}

/// Linear glide from a frozen starting offset into a moving target.
#[derive(Debug, Clone, Default)]
pub struct ScanGlide {
    from: f32,
    remaining: u32,
    total: u32,
}

impl ScanGlide {
    /// Start (or restart) a glide from `from`. Any glide in flight is
    /// replaced.
    pub fn start(&mut self, from: f32, samples: u32) {
        self.from = from;
        self.total = samples.max(1);
        self.remaining = self.total;
    }

    pub fn cancel(&mut self) {
        self.remaining = 0;
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Blend this sample's `target` with the glide start.
    #[inline]
    pub fn apply(&mut self, target: f32) -> f32 {
        if self.remaining == 0 {
            return target;
        }
        self.remaining -= 1;
        let progress = 1.0 - self.remaining as f32 / self.total as f32;
        self.from + (target - self.from) * progress
    }
}

/// Crossfade state between an outgoing and an incoming window length.
#[derive(Debug, Clone)]
pub struct WindowCrossfade {
    current: f32,
    previous: f32,
    remaining: u32,
    total: u32,
}

impl Default for WindowCrossfade {
    fn default() -> Self {
        Self {
            current: 1.0,
            previous: 1.0,
            remaining: 0,
            total: 1,
        }
    }
}

impl WindowCrossfade {
    /// Jump straight to `seconds` with no fade.
    pub fn snap(&mut self, seconds: f32) {
        self.current = seconds;
        self.previous = seconds;
        self.remaining = 0;
    }

    /// Begin fading towards `seconds`.
    ///
    /// If a fade is already running, the outgoing window becomes the
    /// length the old fade had reached, so the heads never snap back to a
    /// window that is no longer audible.
    pub fn set_target(&mut self, seconds: f32, sample_rate: f32) {
        if (seconds - self.current).abs() <= WINDOW_EPSILON {
            return;
        }

        self.previous = self.effective();
        self.current = seconds;
        self.total = ramp_samples(WINDOW_CROSSFADE_SECONDS, sample_rate);
        self.remaining = self.total;
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn previous(&self) -> f32 {
        self.previous
    }

    /// 0 = all outgoing, 1 = all incoming.
    pub fn progress(&self) -> f32 {
        1.0 - self.remaining as f32 / self.total as f32
    }

    /// Blend a read of the outgoing window with a read of the incoming one.
    /// Returns `incoming` exactly once the fade is done, and `outgoing`
    /// exactly when both reads agree.
    #[inline]
    pub fn blend(&self, outgoing: f32, incoming: f32) -> f32 {
        if self.is_active() {
            outgoing + (incoming - outgoing) * self.progress()
        } else {
            incoming
        }
    }

    /// The window length the fade has currently reached.
    pub fn effective(&self) -> f32 {
        if self.is_active() {
            self.previous + (self.current - self.previous) * self.progress()
        } else {
            self.current
        }
    }

    #[inline]
    pub fn advance(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}
