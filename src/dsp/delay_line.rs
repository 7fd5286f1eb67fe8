//! # Short Modulation Delay Line
//!
//! The wobble and pitch-drift modifiers bend pitch the way a tape machine
//! does: by continuously changing how far behind the "write head" they
//! listen. That needs a few milliseconds of history per channel and a
//! fractional read position, which is what this line provides.
//!
//! Unlike the main memory, the read happens *before* the current frame is
//! written, so a delay of 1.0 is the previous frame:
//!
//! 1. `read(channel, delay)` for each channel
//! 2. `write(channel, sample)` for each channel
//! 3. `advance()` once per frame, after the last channel
//!
//! Both channels share one cursor so left and right stay time-aligned.

/// Linearly interpolated stereo delay line with a shared cursor.
#[derive(Debug, Default)]
pub struct DelayLine {
    buffers: [Vec<f32>; 2],
    write_pos: usize,
}

impl DelayLine {
    /// Allocate enough history for `max_delay_ms` at `sample_rate`, plus two
    /// frames of headroom for the interpolation neighbour.
    pub fn prepare(&mut self, sample_rate: f32, max_delay_ms: f32) {
        let frames = (sample_rate * max_delay_ms / 1000.0).ceil();
        let len = if frames.is_finite() && frames > 0.0 {
            frames as usize + 2
        } else {
            3
        };

        self.buffers = [vec![0.0; len], vec![0.0; len]];
        self.write_pos = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffers[0].len()
    }

    /// Store `sample` at the cursor. Does not advance.
    #[inline]
    pub fn write(&mut self, channel: usize, sample: f32) {
        let pos = self.write_pos;
        if let Some(slot) = self.buffers[channel.min(1)].get_mut(pos) {
            *slot = sample;
        }
    }

    /// Read `delay_samples` frames back from the cursor. The delay is
    /// clamped to `[1, len - 1]`: a delay of zero would hit the slot that
    /// is about to be overwritten, which still holds the oldest frame.
    pub fn read(&self, channel: usize, delay_samples: f32) -> f32 {
        let len = self.capacity();
        if len < 2 {
            return 0.0;
        }

        let delay = if delay_samples.is_nan() {
            1.0
        } else {
            delay_samples.clamp(1.0, (len - 1) as f32)
        };
        let delay_int = delay as usize;
        let delay_frac = delay - delay_int as f32;

        let index_a = (self.write_pos + len - delay_int) % len;
        let index_b = (self.write_pos + 2 * len - delay_int - 1) % len;

        let buffer = &self.buffers[channel.min(1)];
        let sample_a = buffer[index_a];
        let sample_b = buffer[index_b];

        sample_a + (sample_b - sample_a) * delay_frac
    }

    /// Move the cursor forward one frame.
    #[inline]
    pub fn advance(&mut self) {
        let len = self.capacity();
        if len > 0 {
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Silence both channels and rewind.
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
    }
}
