//! Host transport tracking for deterministic reseeding.
//!
//! The random generator is reseeded from `(seed, position)` whenever
//! playback starts or the playhead jumps backwards (a loop or a rewind).
//! Replaying the same passage with the same seed then reproduces the same
//! modulation trace. The tracker only records that a reseed is due; the
//! engine consumes it once at the start of the next block and restarts its
//! modulation sources along with the generator.

#[derive(Debug, Clone, Default)]
pub struct TransportTracker {
    last_position: Option<i64>,
    was_playing: bool,
    pending: Option<i64>,
}

impl TransportTracker {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed the host's transport state for the coming block.
    pub fn update(&mut self, position_samples: i64, playing: bool) {
        if playing {
            let started = !self.was_playing;
            let rewound = self
                .last_position
                .is_some_and(|last| position_samples < last);
            if started || rewound {
                self.pending = Some(position_samples);
            }
        }

        self.last_position = Some(position_samples);
        self.was_playing = playing;
    }

    /// Ask for a reseed at the last known position, e.g. after the user
    /// changed the seed.
    pub fn request_reseed(&mut self) {
        self.pending = Some(self.last_position.unwrap_or(0));
    }

    /// The position to reseed at, if a reseed is due. Clears the request.
    pub fn take_pending(&mut self) -> Option<i64> {
        self.pending.take()
    }

    pub fn last_position(&self) -> Option<i64> {
        self.last_position
    }
}
