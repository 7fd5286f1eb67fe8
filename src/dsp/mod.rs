//! # DSP Primitives
//!
//! The building blocks the memory delay engine is assembled from:
//!
//! - **`ring_buffer`**: the long two-channel history every read head looks
//!   back into, with fractional-delay reads.
//!
//! - **`playhead`**: maps a normalized scan position plus a spread offset
//!   onto a delay into the ring buffer.
//!
//! - **`random`**: a small seedable generator. Every random decision in the
//!   plugin draws from one instance, so a seed replays bit-for-bit.
//!
//! - **`modifiers`**: the lo-fi chain (smoothing, pitch drift, wobble,
//!   dropout) driven by the character macro.
//!
//! - **`delay_line`** and **`filter`**: the short modulated delay and the
//!   one-pole lowpass the modifiers are built from.

pub mod delay_line;
pub mod filter;
pub mod modifiers;
pub mod playhead;
pub mod random;
pub mod ring_buffer;
