//! # Memory Ring Buffer
//!
//! The long stereo history the whole effect is built around. Incoming
//! audio (plus whatever the feedback path recirculates) is written here one
//! frame at a time, and the read heads look back into it at arbitrary,
//! continuously changing fractional delays.
//!
//! ## Cursor convention
//!
//! `write_index` always points at the slot that will be overwritten *next*.
//! The most recent frame ("now") therefore lives at `write_index - 1`, and a
//! delay of `d` samples addresses the slot `write_index - 1 - d`:
//!
//! ```text
//!   slot:   0    1    2    3    4    5
//!         [ 19 | 20 | 15 | 16 | 17 | 18 ]
//!                    ^ write_index = 2
//!   delay 0 -> slot 1 (20.0)   delay 1 -> slot 0 (19.0)
//!   delay 2 -> slot 5 (18.0)   ...
//! ```
//!
//! ## Tolerance
//!
//! Automated parameter ramps can briefly ask for delays a hair outside the
//! buffer. Reads never fail: delays are clamped to `[0, N - 1]` and a NaN
//! delay reads "now".

/// Two-channel circular sample store with a single write cursor.
///
/// Sized once in [`prepare()`](Self::prepare); everything else is
/// allocation-free so it can run on the audio thread.
#[derive(Debug, Default)]
pub struct RingBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
    write_index: usize,
}

impl RingBuffer {
    /// Allocate `ceil(sample_rate * max_seconds)` frames per channel and
    /// zero them. A non-positive or non-finite size yields an empty buffer,
    /// which the engine treats as "not prepared".
    pub fn prepare(&mut self, sample_rate: f64, max_seconds: f32) {
        let frames = sample_rate * f64::from(max_seconds);
        // `as usize` saturates (NaN -> 0), so hostile input cannot panic here.
        let capacity = if frames.is_finite() && frames > 0.0 {
            frames.ceil() as usize
        } else {
            0
        };

        self.left = vec![0.0; capacity];
        self.right = vec![0.0; capacity];
        self.write_index = 0;
    }

    /// Zero both channels and rewind the cursor without reallocating.
    pub fn reset(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.write_index = 0;
    }

    /// Number of frames stored per channel.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Store one stereo frame at the cursor, then advance and wrap.
    #[inline]
    pub fn write_sample(&mut self, left: f32, right: f32) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        self.left[self.write_index] = left;
        self.right[self.write_index] = right;
        self.write_index = (self.write_index + 1) % capacity;
    }

    /// The frame that the next [`write_sample()`](Self::write_sample) will
    /// overwrite. Collect mode decays this value instead of discarding it.
    #[inline]
    pub fn pending_slot(&self, channel: usize) -> f32 {
        if self.capacity() == 0 {
            return 0.0;
        }
        self.channel(channel)[self.write_index]
    }

    /// Raw access by absolute slot index (wrapped). Used by tests and
    /// debugging tools, never by the read heads.
    pub fn sample_at(&self, channel: usize, index: usize) -> f32 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.channel(channel)[index % capacity]
    }

    /// Read `delay_samples` behind the most recent frame, linearly
    /// interpolating between the two neighbouring slots.
    pub fn read(&self, channel: usize, delay_samples: f32) -> f32 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }

        let delay = if delay_samples.is_nan() {
            0.0
        } else {
            delay_samples.clamp(0.0, (capacity - 1) as f32)
        };

        let delay_int = delay as usize;
        let frac = delay - delay_int as f32;

        // "now" is write_index - 1; add capacity multiples to stay unsigned.
        let newer = (self.write_index + capacity - 1 - delay_int) % capacity;
        let older = (self.write_index + 2 * capacity - 2 - delay_int) % capacity;

        let data = self.channel(channel);
        let a = data[newer];
        let b = data[older];

        // a + (b - a) * frac returns `a` exactly when frac == 0.
        a + (b - a) * frac
    }

    #[inline]
    fn channel(&self, channel: usize) -> &[f32] {
        nih_plug::nih_debug_assert!(channel < 2, "memory has two channels, got {}", channel);
        if channel == 0 {
            &self.left
        } else {
            &self.right
        }
    }
}
