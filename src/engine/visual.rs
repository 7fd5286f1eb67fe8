//! Lock-free visualization snapshot.
//!
//! The audio thread publishes a coarse energy map of the memory and the two
//! head positions once per block; a display thread polls them on its own
//! timer. Every value is an independent atomic scalar written and read with
//! `Relaxed` ordering: a reader may see bins from two different blocks,
//! which is fine for a picture that refreshes thirty times a second. There
//! is no lock, so the audio thread can never be blocked by a slow reader.

use std::sync::atomic::{AtomicUsize, Ordering};

use nih_plug::prelude::AtomicF32;

/// Number of energy bins the memory is divided into.
pub const ENERGY_BINS: usize = 128;

/// Per-sample integration constant for the energy bins.
pub const ENERGY_DECAY: f32 = 0.98;

/// The shared, atomically updated view. Wrap it in an `Arc` to hand it to a
/// display thread.
#[derive(Debug)]
pub struct VisualSnapshot {
    energy: [AtomicF32; ENERGY_BINS],
    primary_position: AtomicF32,
    secondary_position: AtomicF32,
    write_index: AtomicUsize,
    write_bin: AtomicUsize,
}

impl Default for VisualSnapshot {
    fn default() -> Self {
        Self {
            energy: std::array::from_fn(|_| AtomicF32::new(0.0)),
            primary_position: AtomicF32::new(0.0),
            secondary_position: AtomicF32::new(0.0),
            write_index: AtomicUsize::new(0),
            write_bin: AtomicUsize::new(0),
        }
    }
}

/// A plain copy of the snapshot for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualFrame {
    /// Energy per bin, ring-indexed: bin `write_bin` is the one currently
    /// being recorded over.
    pub energy: [f32; ENERGY_BINS],
    /// Primary head delay as a fraction of the whole memory.
    pub primary_position: f32,
    /// Secondary head delay as a fraction of the whole memory.
    pub secondary_position: f32,
    /// Frame of the memory the next sample will be written to.
    pub write_index: usize,
    /// Bin under the write head.
    pub write_bin: usize,
}

impl Default for VisualFrame {
    fn default() -> Self {
        Self {
            energy: [0.0; ENERGY_BINS],
            primary_position: 0.0,
            secondary_position: 0.0,
            write_index: 0,
            write_bin: 0,
        }
    }
}

impl VisualSnapshot {
    /// Audio thread: store one block's worth of state.
    pub fn publish(
        &self,
        energy: &[f32; ENERGY_BINS],
        primary: f32,
        secondary: f32,
        write_index: usize,
        write_bin: usize,
    ) {
        for (slot, value) in self.energy.iter().zip(energy) {
            slot.store(*value, Ordering::Relaxed);
        }
        self.primary_position.store(primary, Ordering::Relaxed);
        self.secondary_position.store(secondary, Ordering::Relaxed);
        self.write_index.store(write_index, Ordering::Relaxed);
        self.write_bin.store(write_bin % ENERGY_BINS, Ordering::Relaxed);
    }

    /// Any thread: copy the current values into `frame`.
    pub fn load_into(&self, frame: &mut VisualFrame) {
        for (value, slot) in frame.energy.iter_mut().zip(&self.energy) {
            *value = slot.load(Ordering::Relaxed);
        }
        frame.primary_position = self.primary_position.load(Ordering::Relaxed);
        frame.secondary_position = self.secondary_position.load(Ordering::Relaxed);
        frame.write_index = self.write_index.load(Ordering::Relaxed);
        frame.write_bin = self.write_bin.load(Ordering::Relaxed);
    }

    /// Zero everything. Only meaningful while the audio thread is idle.
    pub fn clear(&self) {
        self.publish(&[0.0; ENERGY_BINS], 0.0, 0.0, 0, 0);
    }
}
