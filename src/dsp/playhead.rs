//! # Read Heads
//!
//! A playhead turns a normalized scan position into a delay and asks the
//! memory for the sample there:
//!
//! ```text
//! delay_seconds = offset * max_delay_seconds + spread_seconds   (>= 0)
//! delay_samples = delay_seconds * sample_rate                   (<= N - 1)
//! ```
//!
//! It owns no audio. The engine passes the memory in on every read, and the
//! position is re-evaluated every sample because scan automation, tape
//! motion and window crossfades all move it continuously.

use super::ring_buffer::RingBuffer;

#[derive(Debug, Clone)]
pub struct Playhead {
    /// 0 = most recent frame, 1 = the far end of the delay window.
    offset_normalized: f32,
    /// Extra delay on top of the scan position. Negative reads ahead of
    /// the other head.
    spread_seconds: f32,
    max_delay_seconds: f32,
}

impl Default for Playhead {
    fn default() -> Self {
        Self {
            offset_normalized: 0.0,
            spread_seconds: 0.0,
            max_delay_seconds: 1.0,
        }
    }
}

impl Playhead {
    pub fn set_offset_normalized(&mut self, offset: f32) {
        self.offset_normalized = if offset.is_nan() {
            0.0
        } else {
            offset.clamp(0.0, 1.0)
        };
    }

    pub fn set_spread(&mut self, spread_seconds: f32) {
        self.spread_seconds = if spread_seconds.is_finite() {
            spread_seconds
        } else {
            0.0
        };
    }

    pub fn set_max_delay_seconds(&mut self, seconds: f32) {
        self.max_delay_seconds = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
    }

    pub fn offset_normalized(&self) -> f32 {
        self.offset_normalized
    }

    pub fn spread(&self) -> f32 {
        self.spread_seconds
    }

    pub fn max_delay_seconds(&self) -> f32 {
        self.max_delay_seconds
    }

    /// Read at the head's own window length and spread.
    #[inline]
    pub fn read_sample(&self, memory: &RingBuffer, channel: usize, sample_rate: f32) -> f32 {
        self.read_sample_with(
            memory,
            channel,
            sample_rate,
            self.max_delay_seconds,
            self.spread_seconds,
        )
    }

    /// Read with a temporary window length and spread. The window crossfade
    /// uses this to evaluate the outgoing window without touching the head.
    #[inline]
    pub fn read_sample_with(
        &self,
        memory: &RingBuffer,
        channel: usize,
        sample_rate: f32,
        max_delay_seconds: f32,
        spread_seconds: f32,
    ) -> f32 {
        let delay_samples = self.delay_samples(memory, sample_rate, max_delay_seconds, spread_seconds);
        memory.read(channel, delay_samples)
    }

    /// The clamped delay, in samples, that a read with these settings uses.
    pub fn delay_samples(
        &self,
        memory: &RingBuffer,
        sample_rate: f32,
        max_delay_seconds: f32,
        spread_seconds: f32,
    ) -> f32 {
        let total_seconds = (self.offset_normalized * max_delay_seconds + spread_seconds).max(0.0);
        let limit = memory.capacity().saturating_sub(1) as f32;
        (total_seconds * sample_rate).min(limit)
    }
}
