//! Tape motion: autonomous scan jumps with hold/slew timing.
//!
//! Emulates a loose tape loop whose playback point wanders. The head sits
//! still for a random while (Hold), then glides to a new spot (Slewing),
//! then holds again:
//!
//! ```text
//!   Hold(0.5–4 s) ──expired──► Slewing(0.35 s) ──arrived──► Hold(...)
//! ```
//!
//! Positions are ratios of the tape window (`0` = newest, `1` = oldest).
//! Most jumps (80 %) are "near": a small step either way from where the
//! head is. The rest are "deep": anywhere in the back three quarters of
//! the window.

use crate::dsp::random::RandomGenerator;

const HOLD_SECONDS: (f32, f32) = (0.5, 4.0);
const SLEW_SECONDS: f32 = 0.35;
const NEAR_PROBABILITY: f32 = 0.8;
const NEAR_STEP: (f32, f32) = (0.02, 0.15);
const DEEP_RANGE: (f32, f32) = (0.25, 1.0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TapePhase {
    Hold { remaining: u32 },
    Slewing { from: f32, to: f32, elapsed: u32, total: u32 },
}

#[derive(Debug, Clone)]
pub struct TapeMotion {
    phase: TapePhase,
    position: f32,
}

impl Default for TapeMotion {
    fn default() -> Self {
        Self {
            // An expired hold: the first sample picks a destination.
            phase: TapePhase::Hold { remaining: 0 },
            position: 0.0,
        }
    }
}

impl TapeMotion {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Continue from `position` instead of the newest frame, so engaging
    /// tape mode does not yank the heads.
    pub fn resume_from(&mut self, position: f32) {
        self.position = position.clamp(0.0, 1.0);
        self.phase = TapePhase::Hold { remaining: 0 };
    }

    pub fn phase(&self) -> TapePhase {
        self.phase
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    /// Advance one sample and return the position as a window ratio.
    pub fn next(&mut self, sample_rate: f32, rng: &mut RandomGenerator) -> f32 {
        match self.phase {
            TapePhase::Hold { remaining: 0 } => {
                let to = self.pick_destination(rng);
                let total = frames(SLEW_SECONDS, sample_rate);
                self.phase = TapePhase::Slewing {
                    from: self.position,
                    to,
                    elapsed: 0,
                    total,
                };
            }
            TapePhase::Hold { remaining } => {
                self.phase = TapePhase::Hold {
                    remaining: remaining - 1,
                };
            }
            TapePhase::Slewing {
                from,
                to,
                elapsed,
                total,
            } => {
                let elapsed = elapsed + 1;
                if elapsed >= total {
                    self.position = to;
                    let seconds = rng.next_float_range(HOLD_SECONDS.0, HOLD_SECONDS.1);
                    self.phase = TapePhase::Hold {
                        remaining: frames(seconds, sample_rate),
                    };
                } else {
                    self.position = from + (to - from) * (elapsed as f32 / total as f32);
                    self.phase = TapePhase::Slewing {
                        from,
                        to,
                        elapsed,
                        total,
                    };
                }
            }
        }

        self.position
    }

    fn pick_destination(&self, rng: &mut RandomGenerator) -> f32 {
        if rng.next_float01() < NEAR_PROBABILITY {
            let step = rng.next_float_range(NEAR_STEP.0, NEAR_STEP.1);
            let forward = rng.next_float01() < 0.5;
            let candidate = if forward {
                self.position + step
            } else {
                self.position - step
            };
            // Bounce off the ends rather than pinning to them.
            let candidate = if (0.0..=1.0).contains(&candidate) {
                candidate
            } else if forward {
                self.position - step
            } else {
                self.position + step
            };
            candidate.clamp(0.0, 1.0)
        } else {
            rng.next_float_range(DEEP_RANGE.0, DEEP_RANGE.1)
        }
    }
}

#[inline]
fn frames(seconds: f32, sample_rate: f32) -> u32 {
    let frames = seconds * sample_rate;
    if frames.is_finite() && frames > 1.0 {
        frames as u32
    } else {
        1
    }
}
