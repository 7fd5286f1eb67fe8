//! # Memory Delay Engine
//!
//! The per-sample state machine that ties the memory, the two read heads,
//! the modifier banks and the random generator together.
//!
//! ## Signal Flow
//!
//! ```text
//!                      ┌──────────── scan offset ─────────────┐
//!                      │ latch > tape > auto > manual (glide) │
//!                      └──────────────────┬───────────────────┘
//!                                         ▼
//!           ┌───────────────────► [primary + secondary heads] ──► avg ──► [Out banks] ── wet
//!           │                     (crossfading window lengths)                          │
//!           │                                                                           │
//! dry ──┬───│──────────────────────────────────────────────────────────────► flags ──►(+)──► out
//!       │   │                                                                           │
//!       │  [memory] ◄── tanh ◄──(+)◄── [Feed banks] ◄── × feedback ◄── none/wet/out ◄───┘
//!       │                        ▲
//!       └──► [In banks] ─────────┘        (Collect adds 0.98 × the slot being overwritten)
//! ```
//!
//! ## Block protocol
//!
//! Parameters arrive once per block through the setters (or
//! [`set_parameters()`](MemoryDelayEngine::set_parameters)). At the start of
//! each block the engine consumes any pending reseed (restarting auto scan,
//! tape motion and the bank modulation from there) and resolves which scan
//! source is active; the flags are fixed for the rest of the block. At the
//! end of the block the visualization snapshot is published.

pub mod bank;
pub mod params;
pub mod scan;
pub mod tape;
pub mod transport;
pub mod visual;

use std::sync::Arc;

use nih_plug::{nih_debug_assert, nih_log};

use crate::dsp::playhead::Playhead;
use crate::dsp::random::RandomGenerator;
use crate::dsp::ring_buffer::RingBuffer;

use bank::ModifierBank;
use params::{clamp_or, MAX_AUTO_SCAN_RATE_HZ, MAX_FEEDBACK, MIN_WINDOW_SECONDS};
use scan::{ramp_samples, AutoScan, ScanGlide, WindowCrossfade, SCAN_GLIDE_SECONDS};
use tape::TapeMotion;
use transport::TransportTracker;
use visual::{ENERGY_BINS, ENERGY_DECAY};

pub use params::{BankRouting, BankSettings, EngineParams, FeedbackMode, StereoMode};
pub use visual::{VisualFrame, VisualSnapshot};

/// How much of the overwritten frame survives a Collect-mode write.
pub const COLLECT_DECAY: f32 = 0.98;

/// Where the scan offset comes from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanSource {
    Latched,
    Tape,
    Auto,
    Manual,
}

/// What the output stage emits for the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStage {
    /// `dry * (1 - mix) + wet * mix`
    Normal,
    /// `wet * mix`
    WetOnly,
    /// `dry`
    Dry,
    /// `dry + wet * mix`. The trails keep the level they had before the
    /// bypass was engaged.
    DryWithTrails,
}

/// What the record stage writes for the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recording {
    /// The memory is left untouched; the cursor still advances.
    Off,
    /// Only the recirculated signal is written.
    FeedbackOnly,
    /// Input plus recirculated signal.
    Full,
}

pub struct MemoryDelayEngine {
    /// Host sample rate, 0 until prepared.
    sample_rate: f64,
    memory: RingBuffer,
    primary: Playhead,
    secondary: Playhead,
    banks: [ModifierBank; 2],
    rng: RandomGenerator,
    params: EngineParams,

    window: WindowCrossfade,
    auto_scan: AutoScan,
    glide: ScanGlide,
    tape: TapeMotion,
    scan_source: ScanSource,
    auto_rate_changed: bool,
    /// Offset emitted on the previous sample, the start of any new glide.
    last_offset: f32,
    latched_offset: f32,

    transport: TransportTracker,
    energy: [f32; ENERGY_BINS],
    visual: Arc<VisualSnapshot>,
}

impl Default for MemoryDelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDelayEngine {
    /// An unprepared engine. Until [`prepare()`](Self::prepare) is called
    /// every block passes its input straight through.
    pub fn new() -> Self {
        let params = EngineParams::DEFAULT;
        let mut rng = RandomGenerator::default();
        rng.reseed(params.seed, 0);

        let mut banks = [ModifierBank::default(), ModifierBank::default()];
        banks[0].set_settings(params.bank_a);
        banks[1].set_settings(params.bank_b);

        Self {
            sample_rate: 0.0,
            memory: RingBuffer::default(),
            primary: Playhead::default(),
            secondary: Playhead::default(),
            banks,
            rng,
            params,
            window: WindowCrossfade::default(),
            auto_scan: AutoScan::default(),
            glide: ScanGlide::default(),
            tape: TapeMotion::default(),
            scan_source: ScanSource::Manual,
            auto_rate_changed: false,
            last_offset: 0.0,
            latched_offset: 0.0,
            transport: TransportTracker::default(),
            energy: [0.0; ENERGY_BINS],
            visual: Arc::new(VisualSnapshot::default()),
        }
    }

    /// Allocate the memory and size every time-based component. This is the
    /// only call that allocates.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize, max_delay_seconds: f32) {
        self.sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            0.0
        };
        self.memory.prepare(self.sample_rate, max_delay_seconds);

        let sample_rate = self.sample_rate as f32;
        for bank in &mut self.banks {
            bank.prepare(sample_rate);
        }

        let window = self.window_seconds(self.params.time);
        self.window.snap(window);
        self.primary.set_max_delay_seconds(window);
        self.secondary.set_max_delay_seconds(window);

        nih_log!(
            "memory delay prepared: {} frames at {} Hz (max block {})",
            self.memory.capacity(),
            self.sample_rate,
            max_block_size
        );

        self.reset();
    }

    /// Zero the memory and every piece of modulation state without
    /// reallocating. Only call this while the audio thread is idle.
    pub fn reset(&mut self) {
        self.memory.reset();
        for bank in &mut self.banks {
            bank.reset();
        }

        self.window.snap(self.window.current());
        self.auto_scan.reset();
        self.glide.cancel();
        self.tape.reset();
        self.scan_source = ScanSource::Manual;
        self.auto_rate_changed = false;
        self.last_offset = 0.0;
        self.latched_offset = 0.0;

        self.transport.reset();
        self.rng.reseed(self.params.seed, 0);

        self.energy = [0.0; ENERGY_BINS];
        self.visual.clear();
    }

    // ─────────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────────

    /// Apply a whole parameter snapshot. Each value goes through its own
    /// setter, so the snapshot may hold anything.
    pub fn set_parameters(&mut self, params: &EngineParams) {
        self.set_mix(params.mix);
        self.set_scan(params.scan);
        self.set_auto_scan_rate(params.auto_scan_rate);
        self.set_spread(params.spread);
        self.set_feedback(params.feedback);
        self.set_time(params.time);
        self.set_character(params.character);
        self.set_stereo_mode(params.stereo_mode);
        self.set_feedback_mode(params.feedback_mode);
        self.set_random_seed(params.seed);
        self.set_bypass(params.bypass);
        self.set_latch(params.latch);
        self.set_trails(params.trails);
        self.set_wipe(params.wipe);
        self.set_always_record(params.always_record);
        self.set_tape_mode(params.tape_mode);
        self.set_tape_window(params.tape_window);
        self.set_bank(0, params.bank_a);
        self.set_bank(1, params.bank_b);
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.params.mix = clamp_or(mix, 0.0, 1.0, EngineParams::DEFAULT.mix);
    }

    pub fn set_scan(&mut self, scan: f32) {
        self.params.scan = clamp_or(scan, 0.0, 1.0, EngineParams::DEFAULT.scan);
    }

    /// Auto-scan rate in Hz. 0 selects manual scanning.
    pub fn set_auto_scan_rate(&mut self, rate_hz: f32) {
        let rate = clamp_or(
            rate_hz,
            0.0,
            MAX_AUTO_SCAN_RATE_HZ,
            EngineParams::DEFAULT.auto_scan_rate,
        );
        if rate != self.params.auto_scan_rate {
            self.auto_rate_changed = true;
        }
        self.params.auto_scan_rate = rate;
    }

    /// Secondary head offset in seconds. Negative values read ahead of the
    /// primary head; the heads clamp the resulting delay to the memory.
    pub fn set_spread(&mut self, spread_seconds: f32) {
        let spread = if spread_seconds.is_finite() {
            spread_seconds
        } else {
            EngineParams::DEFAULT.spread
        };
        self.params.spread = spread;
        self.secondary.set_spread(spread);
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.params.feedback = clamp_or(feedback, 0.0, MAX_FEEDBACK, EngineParams::DEFAULT.feedback);
    }

    /// Delay window in seconds. A change crossfades between the old and the
    /// new window instead of jumping.
    pub fn set_time(&mut self, seconds: f32) {
        let seconds = clamp_or(seconds, MIN_WINDOW_SECONDS, f32::MAX, EngineParams::DEFAULT.time);
        self.params.time = seconds;

        let window = self.window_seconds(seconds);
        self.window.set_target(window, self.sample_rate as f32);
        self.primary.set_max_delay_seconds(window);
        self.secondary.set_max_delay_seconds(window);
    }

    pub fn set_character(&mut self, character: f32) {
        let character = clamp_or(character, 0.0, 1.0, EngineParams::DEFAULT.character);
        self.params.character = character;
        for bank in &mut self.banks {
            bank.set_character(character);
        }
    }

    pub fn set_stereo_mode(&mut self, mode: StereoMode) {
        self.params.stereo_mode = mode;
    }

    pub fn set_feedback_mode(&mut self, mode: FeedbackMode) {
        self.params.feedback_mode = mode;
    }

    /// A new seed takes effect at the start of the next block, reseeded at
    /// the last transport position the host reported.
    pub fn set_random_seed(&mut self, seed: u32) {
        if seed != self.params.seed {
            self.params.seed = seed;
            self.transport.request_reseed();
        }
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.params.bypass = bypass;
    }

    /// Engaging the latch freezes the heads where they are.
    pub fn set_latch(&mut self, latch: bool) {
        if latch && !self.params.latch {
            self.latched_offset = self.last_offset;
        }
        self.params.latch = latch;
    }

    pub fn set_trails(&mut self, trails: bool) {
        self.params.trails = trails;
    }

    pub fn set_wipe(&mut self, wipe: bool) {
        self.params.wipe = wipe;
    }

    pub fn set_always_record(&mut self, always_record: bool) {
        self.params.always_record = always_record;
    }

    pub fn set_tape_mode(&mut self, tape_mode: bool) {
        self.params.tape_mode = tape_mode;
    }

    /// Portion of the memory, in seconds, tape motion wanders over.
    pub fn set_tape_window(&mut self, seconds: f32) {
        self.params.tape_window = clamp_or(
            seconds,
            MIN_WINDOW_SECONDS,
            f32::MAX,
            EngineParams::DEFAULT.tape_window,
        );
    }

    /// Configure bank `index` (0 = A, 1 = B).
    pub fn set_bank(&mut self, index: usize, settings: BankSettings) {
        nih_debug_assert!(index < 2, "there are only two modifier banks");
        let Some(bank) = self.banks.get_mut(index) else {
            return;
        };
        bank.set_settings(settings);
        let settings = bank.settings();
        match index {
            0 => self.params.bank_a = settings,
            _ => self.params.bank_b = settings,
        }
    }

    /// Report the host transport for the coming block. Starting playback or
    /// jumping backwards schedules a reseed at `position_samples`.
    pub fn set_transport_position(&mut self, position_samples: i64, playing: bool) {
        self.transport.update(position_samples, playing);
    }

    // ─────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────

    /// Process separate input and output buffers. Frames beyond the
    /// shortest slice are left alone.
    pub fn process_block(&mut self, inputs: [&[f32]; 2], outputs: [&mut [f32]; 2]) {
        let [in_l, in_r] = inputs;
        let [out_l, out_r] = outputs;
        let frames = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());

        if self.memory.capacity() == 0 {
            out_l[..frames].copy_from_slice(&in_l[..frames]);
            out_r[..frames].copy_from_slice(&in_r[..frames]);
            return;
        }

        let (stage, recording) = self.begin_block();
        for i in 0..frames {
            let (l, r) = self.process_frame(in_l[i], in_r[i], stage, recording);
            out_l[i] = l;
            out_r[i] = r;
        }
        self.end_block();
    }

    /// Process a host buffer in place. One channel runs the engine on a
    /// duplicated signal and returns the average of both sides; with two or
    /// more channels the first two are processed and the rest are left
    /// alone.
    pub fn process_in_place(&mut self, channels: &mut [&mut [f32]]) {
        if self.memory.capacity() == 0 {
            return;
        }

        match channels {
            [] => {}
            [mono] => {
                let (stage, recording) = self.begin_block();
                for sample in mono.iter_mut() {
                    let (l, r) = self.process_frame(*sample, *sample, stage, recording);
                    *sample = 0.5 * (l + r);
                }
                self.end_block();
            }
            [left, right, ..] => {
                let (stage, recording) = self.begin_block();
                for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                    let (out_l, out_r) = self.process_frame(*l, *r, stage, recording);
                    *l = out_l;
                    *r = out_r;
                }
                self.end_block();
            }
        }
    }

    /// Consume block-start requests and fix the flags for the block.
    fn begin_block(&mut self) -> (OutputStage, Recording) {
        if let Some(position) = self.transport.take_pending() {
            self.replay_from(position);
        }

        let source = self.resolve_scan_source();
        if source != self.scan_source || (source == ScanSource::Auto && self.auto_rate_changed) {
            let samples = ramp_samples(SCAN_GLIDE_SECONDS, self.sample_rate as f32);
            self.glide.start(self.last_offset, samples);
            match source {
                ScanSource::Auto if source != self.scan_source => self.auto_scan.reset(),
                ScanSource::Tape => {
                    let span = self.tape_span();
                    self.tape.resume_from(self.last_offset / span);
                }
                _ => {}
            }
            self.scan_source = source;
        }
        self.auto_rate_changed = false;

        let params = &self.params;
        let collect = params.feedback_mode == FeedbackMode::Collect;

        if params.wipe {
            (OutputStage::WetOnly, Recording::Off)
        } else if params.bypass && !params.trails {
            let recording = if params.always_record || collect {
                Recording::Full
            } else {
                Recording::Off
            };
            (OutputStage::Dry, recording)
        } else if params.bypass || params.latch {
            let stage = if params.bypass {
                OutputStage::DryWithTrails
            } else {
                OutputStage::Normal
            };
            let recording = if params.always_record {
                Recording::Full
            } else {
                Recording::FeedbackOnly
            };
            (stage, recording)
        } else {
            (OutputStage::Normal, Recording::Full)
        }
    }

    /// Reseed from `(seed, position)` and restart every modulation source,
    /// so a passage replays the same trace whatever ran before it. The
    /// heads glide from wherever they were into the restarted motion.
    fn replay_from(&mut self, position: i64) {
        self.rng.reseed(self.params.seed, position);
        self.auto_scan.reset();
        self.tape.reset();
        for bank in &mut self.banks {
            bank.reset_modulation();
        }

        let samples = ramp_samples(SCAN_GLIDE_SECONDS, self.sample_rate as f32);
        self.glide.start(self.last_offset, samples);
    }

    fn end_block(&mut self) {
        let capacity = self.memory.capacity() as f32;
        let sample_rate = self.sample_rate as f32;
        let window = self.window.current();

        let primary = self.primary.delay_samples(&self.memory, sample_rate, window, 0.0) / capacity;
        let secondary = self
            .secondary
            .delay_samples(&self.memory, sample_rate, window, self.secondary.spread())
            / capacity;

        self.visual.publish(
            &self.energy,
            primary,
            secondary,
            self.memory.write_index(),
            self.energy_bin(),
        );
    }

    #[inline]
    fn process_frame(
        &mut self,
        dry_l: f32,
        dry_r: f32,
        stage: OutputStage,
        recording: Recording,
    ) -> (f32, f32) {
        let sample_rate = self.sample_rate as f32;

        // 1. Scan offset
        let offset = self.next_scan_offset(sample_rate);
        self.primary.set_offset_normalized(offset);
        self.secondary.set_offset_normalized(offset);

        // 2. Read both heads
        let (source_l, source_r) = match self.params.stereo_mode {
            StereoMode::Independent => (0, 1),
            StereoMode::Linked => (0, 0),
            StereoMode::Cross => (1, 0),
        };
        let mut wet_l = self.read_heads(source_l, sample_rate);
        let mut wet_r = self.read_heads(source_r, sample_rate);
        self.window.advance();

        // 3. Out banks
        for bank in &mut self.banks {
            if bank.is_routed(BankRouting::Out) {
                (wet_l, wet_r) = bank.process(wet_l, wet_r, &mut self.rng);
            }
        }

        // 4. Output
        let mix = self.params.mix;
        let (out_l, out_r) = match stage {
            OutputStage::Normal => (
                dry_l * (1.0 - mix) + wet_l * mix,
                dry_r * (1.0 - mix) + wet_r * mix,
            ),
            OutputStage::WetOnly => (wet_l * mix, wet_r * mix),
            OutputStage::Dry => (dry_l, dry_r),
            OutputStage::DryWithTrails => (dry_l + wet_l * mix, dry_r + wet_r * mix),
        };

        // 5. Record
        self.record(dry_l, dry_r, (wet_l, wet_r), (out_l, out_r), recording);

        // 6. Energy
        let bin = self.energy_bin();
        let energy = wet_l.abs() + wet_r.abs();
        self.energy[bin] = self.energy[bin] * ENERGY_DECAY + energy * (1.0 - ENERGY_DECAY);

        (out_l, out_r)
    }

    fn record(
        &mut self,
        dry_l: f32,
        dry_r: f32,
        wet: (f32, f32),
        out: (f32, f32),
        recording: Recording,
    ) {
        if recording == Recording::Off {
            // Rewrite the slot as it was: the memory is untouched but the
            // cursor keeps moving, so the history scrolls past the heads.
            let keep_l = self.memory.pending_slot(0);
            let keep_r = self.memory.pending_slot(1);
            self.memory.write_sample(keep_l, keep_r);
            return;
        }

        let (mut in_l, mut in_r) = (0.0, 0.0);
        if recording == Recording::Full {
            (in_l, in_r) = (dry_l, dry_r);
            for bank in &mut self.banks {
                if bank.is_routed(BankRouting::In) {
                    (in_l, in_r) = bank.process(in_l, in_r, &mut self.rng);
                }
            }
        }

        let mode = self.params.feedback_mode;
        let (mut fb_l, mut fb_r) = match mode {
            FeedbackMode::Collect => (0.0, 0.0),
            FeedbackMode::Feed => wet,
            FeedbackMode::Closed => out,
        };
        if mode != FeedbackMode::Collect {
            let feedback = self.params.feedback;
            (fb_l, fb_r) = (fb_l * feedback, fb_r * feedback);
            for bank in &mut self.banks {
                if bank.is_routed(BankRouting::Feed) {
                    (fb_l, fb_r) = bank.process(fb_l, fb_r, &mut self.rng);
                }
            }
        }

        let mut write_l = in_l + fb_l;
        let mut write_r = in_r + fb_r;
        if mode == FeedbackMode::Collect {
            write_l += COLLECT_DECAY * self.memory.pending_slot(0);
            write_r += COLLECT_DECAY * self.memory.pending_slot(1);
        }
        if self.params.stereo_mode == StereoMode::Linked {
            let mono = 0.5 * (write_l + write_r);
            write_l = mono;
            write_r = mono;
        }

        self.memory.write_sample(write_l.tanh(), write_r.tanh());
    }

    /// Average of both heads on `channel`, blended across a window change.
    #[inline]
    fn read_heads(&self, channel: usize, sample_rate: f32) -> f32 {
        let primary = self.read_head(&self.primary, channel, sample_rate);
        let secondary = self.read_head(&self.secondary, channel, sample_rate);
        0.5 * (primary + secondary)
    }

    #[inline]
    fn read_head(&self, head: &Playhead, channel: usize, sample_rate: f32) -> f32 {
        let incoming = head.read_sample(&self.memory, channel, sample_rate);
        if !self.window.is_active() {
            return incoming;
        }
        let outgoing = head.read_sample_with(
            &self.memory,
            channel,
            sample_rate,
            self.window.previous(),
            head.spread(),
        );
        self.window.blend(outgoing, incoming)
    }

    fn resolve_scan_source(&self) -> ScanSource {
        if self.params.latch {
            ScanSource::Latched
        } else if self.params.tape_mode {
            ScanSource::Tape
        } else if self.params.auto_scan_rate > 0.0 {
            ScanSource::Auto
        } else {
            ScanSource::Manual
        }
    }

    #[inline]
    fn next_scan_offset(&mut self, sample_rate: f32) -> f32 {
        let target = match self.scan_source {
            ScanSource::Latched => self.latched_offset,
            ScanSource::Tape => {
                let span = self.tape_span();
                self.tape.next(sample_rate, &mut self.rng) * span
            }
            ScanSource::Auto => {
                self.auto_scan
                    .next(self.params.auto_scan_rate, sample_rate, &mut self.rng)
            }
            ScanSource::Manual => self.params.scan,
        };

        let offset = self.glide.apply(target);
        self.last_offset = offset;
        offset
    }

    /// Fraction of the delay window covered by the tape window.
    fn tape_span(&self) -> f32 {
        let window = self.window.current();
        let tape_window = self.params.tape_window;
        if window > 0.0 && tape_window < window {
            tape_window / window
        } else {
            1.0
        }
    }

    /// The delay window clamped to what the memory can hold.
    fn window_seconds(&self, seconds: f32) -> f32 {
        seconds.max(MIN_WINDOW_SECONDS).min(self.capacity_seconds())
    }

    fn capacity_seconds(&self) -> f32 {
        if self.sample_rate > 0.0 {
            (self.memory.capacity() as f64 / self.sample_rate) as f32
        } else {
            0.0
        }
    }

    #[inline]
    fn energy_bin(&self) -> usize {
        let capacity = self.memory.capacity() as u64;
        if capacity == 0 {
            return 0;
        }
        (self.memory.write_index() as u64 * ENERGY_BINS as u64 / capacity) as usize
    }

    // ─────────────────────────────────────────────────────────────────
    // Visualization and debugging
    // ─────────────────────────────────────────────────────────────────

    /// Copy the last published snapshot into `frame`.
    pub fn get_visual_snapshot(&self, frame: &mut VisualFrame) {
        self.visual.load_into(frame);
    }

    /// A handle a display thread can poll on its own timer.
    pub fn visual_handle(&self) -> Arc<VisualSnapshot> {
        Arc::clone(&self.visual)
    }

    /// The current delay window in seconds after clamping.
    pub fn window_length(&self) -> f32 {
        self.window.current()
    }

    pub fn max_samples(&self) -> usize {
        self.memory.capacity()
    }

    pub fn write_index(&self) -> usize {
        self.memory.write_index()
    }

    pub fn debug_get_memory_sample(&self, channel: usize, index: usize) -> f32 {
        self.memory.sample_at(channel, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 128;

    fn prepared(sample_rate: f64, max_delay_seconds: f32, params: &EngineParams) -> MemoryDelayEngine {
        let mut engine = MemoryDelayEngine::new();
        engine.set_parameters(params);
        engine.prepare(sample_rate, BLOCK, max_delay_seconds);
        engine
    }

    fn quiet_params() -> EngineParams {
        EngineParams {
            feedback: 0.0,
            bank_a: BankSettings::off(),
            ..EngineParams::default()
        }
    }

    /// Run `frames` through the engine one block at a time.
    fn run(engine: &mut MemoryDelayEngine, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut out_l = vec![0.0; left.len()];
        let mut out_r = vec![0.0; right.len()];
        for start in (0..left.len()).step_by(BLOCK) {
            let end = (start + BLOCK).min(left.len());
            engine.process_block(
                [&left[start..end], &right[start..end]],
                [&mut out_l[start..end], &mut out_r[start..end]],
            );
        }
        (out_l, out_r)
    }

    fn noise(seed: u64, frames: usize) -> Vec<f32> {
        let mut rng = RandomGenerator::new(seed);
        (0..frames).map(|_| rng.next_float_signed()).collect()
    }

    #[test]
    fn test_deterministic_output() {
        let params = EngineParams {
            mix: 0.7,
            auto_scan_rate: 0.5,
            spread: 0.13,
            feedback: 0.8,
            time: 1.5,
            character: 0.7,
            feedback_mode: FeedbackMode::Closed,
            seed: 1234,
            bank_b: BankSettings {
                routing: BankRouting::Feed,
                gain: 0.0,
                drive: 0.4,
                tone: -0.3,
            },
            ..EngineParams::default()
        };
        let mut a = prepared(48000.0, 10.0, &params);
        let mut b = prepared(48000.0, 10.0, &params);
        let left = noise(1, BLOCK);
        let right = noise(2, BLOCK);

        for block in 0..32 {
            let position = (block * BLOCK) as i64;
            a.set_transport_position(position, true);
            b.set_transport_position(position, true);
            a.set_parameters(&params);
            b.set_parameters(&params);

            let mut a_l = vec![0.0; BLOCK];
            let mut a_r = vec![0.0; BLOCK];
            let mut b_l = vec![0.0; BLOCK];
            let mut b_r = vec![0.0; BLOCK];
            a.process_block([&left[..], &right[..]], [&mut a_l[..], &mut a_r[..]]);
            b.process_block([&left[..], &right[..]], [&mut b_l[..], &mut b_r[..]]);

            for i in 0..BLOCK {
                assert_eq!(a_l[i].to_bits(), b_l[i].to_bits(), "block {block} frame {i}");
                assert_eq!(a_r[i].to_bits(), b_r[i].to_bits(), "block {block} frame {i}");
            }
        }
    }

    #[test]
    fn test_tape_mode_is_deterministic() {
        let params = EngineParams {
            tape_mode: true,
            tape_window: 0.5,
            character: 0.4,
            seed: 99,
            ..EngineParams::default()
        };
        let mut a = prepared(8000.0, 2.0, &params);
        let mut b = prepared(8000.0, 2.0, &params);
        let input = noise(7, 8000 * 3);

        let (a_l, a_r) = run(&mut a, &input, &input);
        let (b_l, b_r) = run(&mut b, &input, &input);
        assert!(a_l.iter().zip(&b_l).all(|(x, y)| x.to_bits() == y.to_bits()));
        assert!(a_r.iter().zip(&b_r).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_output_stays_bounded_at_maximum_feedback() {
        let params = EngineParams {
            mix: 1.0,
            feedback: MAX_FEEDBACK,
            feedback_mode: FeedbackMode::Closed,
            character: 1.0,
            time: 0.2,
            bank_b: BankSettings {
                routing: BankRouting::Feed,
                gain: 0.0,
                drive: 1.0,
                tone: 1.0,
            },
            ..EngineParams::default()
        };
        let mut engine = prepared(8000.0, 1.0, &params);
        let input: Vec<f32> = (0..8000 * 20).map(|i| (i as f32 * 0.05).sin()).collect();

        let (out_l, out_r) = run(&mut engine, &input, &input);
        for value in out_l.iter().chain(&out_r) {
            assert!(value.is_finite());
            assert!(value.abs() < 4.0, "output grew to {value}");
        }
    }

    #[test]
    fn test_feedback_is_capped() {
        let mut engine = MemoryDelayEngine::new();
        engine.set_feedback(5.0);
        assert_eq!(engine.params().feedback, MAX_FEEDBACK);
    }

    #[test]
    fn test_memory_wraparound() {
        let mut engine = prepared(10.0, 1.0, &quiet_params());
        assert_eq!(engine.max_samples(), 10);

        let ramp: Vec<f32> = (1..=25).map(|i| i as f32 * 0.01).collect();
        run(&mut engine, &ramp, &ramp);

        assert_eq!(engine.write_index(), 5);
        assert_eq!(engine.debug_get_memory_sample(0, 4), (25.0_f32 * 0.01).tanh());
        assert_eq!(engine.debug_get_memory_sample(1, 5), (16.0_f32 * 0.01).tanh());
    }

    #[test]
    fn test_collect_overdub_accumulates() {
        let params = EngineParams {
            feedback_mode: FeedbackMode::Collect,
            time: MIN_WINDOW_SECONDS,
            ..quiet_params()
        };
        let mut engine = prepared(1.0, 1.0, &params);
        assert_eq!(engine.max_samples(), 1);

        let mut previous = 0.0;
        for pass in 0..5 {
            run(&mut engine, &[0.1], &[0.1]);

            let stored = engine.debug_get_memory_sample(0, 0);
            assert!(stored > previous, "pass {pass}: {stored} <= {previous}");
            previous = stored;
        }
    }

    #[test]
    fn test_reset_clears_memory() {
        let mut engine = prepared(1000.0, 1.0, &EngineParams::default());
        let input = noise(3, 1500);
        run(&mut engine, &input, &input);

        engine.reset();
        assert_eq!(engine.write_index(), 0);
        for index in 0..engine.max_samples() {
            assert_eq!(engine.debug_get_memory_sample(0, index), 0.0);
            assert_eq!(engine.debug_get_memory_sample(1, index), 0.0);
        }

        let mut frame = VisualFrame::default();
        engine.get_visual_snapshot(&mut frame);
        assert_eq!(frame, VisualFrame::default());
    }

    #[test]
    fn test_reset_replays_identically() {
        let params = EngineParams {
            auto_scan_rate: 2.0,
            character: 0.9,
            seed: 5,
            ..EngineParams::default()
        };
        let mut engine = prepared(8000.0, 2.0, &params);
        let input = noise(4, 4000);

        engine.reset();
        let first = run(&mut engine, &input, &input);
        run(&mut engine, &noise(9, 1000), &noise(10, 1000));
        engine.reset();
        let second = run(&mut engine, &input, &input);

        assert!(first.0.iter().zip(&second.0).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(first.1.iter().zip(&second.1).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_out_of_range_parameters_are_clamped() {
        let mut engine = prepared(1000.0, 2.0, &quiet_params());

        engine.set_scan(7.0);
        assert_eq!(engine.params().scan, 1.0);
        engine.set_scan(-7.0);
        assert_eq!(engine.params().scan, 0.0);
        engine.set_mix(f32::NAN);
        assert_eq!(engine.params().mix, EngineParams::DEFAULT.mix);
        engine.set_time(1000.0);
        assert_eq!(engine.window_length(), 2.0);
        engine.set_time(0.0);
        assert_eq!(engine.params().time, MIN_WINDOW_SECONDS);

        let input = noise(5, 3000);
        let (out_l, _) = run(&mut engine, &input, &input);
        assert!(out_l.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cross_mode_swaps_channels() {
        let params = EngineParams {
            mix: 1.0,
            stereo_mode: StereoMode::Cross,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 1.0, &params);

        let (out_l, out_r) = run(&mut engine, &[0.5, 0.0], &[-0.25, 0.0]);

        let recorded_l = engine.debug_get_memory_sample(0, 0);
        let recorded_r = engine.debug_get_memory_sample(1, 0);
        assert_eq!(recorded_l, 0.5_f32.tanh());
        assert_eq!(recorded_r, (-0.25_f32).tanh());
        // At zero delay the left output plays what the right side recorded.
        assert_eq!(out_l[1], recorded_r);
        assert_eq!(out_r[1], recorded_l);
    }

    #[test]
    fn test_linked_mode_records_mono() {
        let params = EngineParams {
            stereo_mode: StereoMode::Linked,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 1.0, &params);
        run(&mut engine, &[0.5], &[0.0]);

        assert_eq!(engine.debug_get_memory_sample(0, 0), 0.25_f32.tanh());
        assert_eq!(engine.debug_get_memory_sample(1, 0), 0.25_f32.tanh());
    }

    #[test]
    fn test_unprepared_engine_passes_through() {
        let mut engine = MemoryDelayEngine::new();
        let left = [0.1, 0.2, 0.3];
        let right = [-0.1, -0.2, -0.3];
        let mut out_l = [0.0_f32; 3];
        let mut out_r = [0.0_f32; 3];

        engine.process_block([&left[..], &right[..]], [&mut out_l[..], &mut out_r[..]]);
        assert_eq!(out_l, left);
        assert_eq!(out_r, right);

        let mut buffer = [0.4, 0.5];
        engine.process_in_place(&mut [&mut buffer[..]]);
        assert_eq!(buffer, [0.4, 0.5]);
    }

    #[test]
    fn test_wipe_outputs_wet_and_keeps_memory() {
        let mut engine = prepared(100.0, 1.0, &quiet_params());
        run(&mut engine, &[0.5; 100], &[0.5; 100]);
        let held = 0.5_f32.tanh();

        engine.set_wipe(true);
        let (out_l, out_r) = run(&mut engine, &[0.9; 50], &[0.9; 50]);

        for (l, r) in out_l.iter().zip(&out_r) {
            assert!((l - held * 0.5).abs() < 1e-6);
            assert!((r - held * 0.5).abs() < 1e-6);
        }
        for index in 0..100 {
            assert_eq!(engine.debug_get_memory_sample(0, index), held);
        }
        assert_eq!(engine.write_index(), 50);
    }

    #[test]
    fn test_bypass_without_trails_is_dry_and_stops_recording() {
        let params = EngineParams {
            bypass: true,
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        let input = noise(6, 60);

        let (out_l, out_r) = run(&mut engine, &input, &input);
        assert_eq!(out_l, input);
        assert_eq!(out_r, input);
        for index in 0..100 {
            assert_eq!(engine.debug_get_memory_sample(0, index), 0.0);
        }
    }

    #[test]
    fn test_bypass_with_always_record_keeps_recording() {
        let params = EngineParams {
            bypass: true,
            always_record: true,
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        run(&mut engine, &[0.3], &[0.3]);

        assert_eq!(engine.debug_get_memory_sample(0, 0), 0.3_f32.tanh());
    }

    #[test]
    fn test_bypass_with_trails_adds_wet_to_dry() {
        // Half a second back, clear of what the trails pass re-records.
        let params = EngineParams {
            scan: 0.5,
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        run(&mut engine, &[0.5; 100], &[0.5; 100]);
        let held = 0.5_f32.tanh();

        engine.set_bypass(true);
        engine.set_trails(true);
        let (out_l, _) = run(&mut engine, &[0.2; 10], &[0.2; 10]);

        for value in out_l {
            assert!((value - (0.2 + held * 0.5)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_latch_stops_input_recording() {
        let params = EngineParams {
            latch: true,
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        let (out_l, _) = run(&mut engine, &[0.5; 40], &[0.5; 40]);

        for value in out_l {
            assert!((value - 0.25).abs() < 1e-6);
        }
        for index in 0..100 {
            assert_eq!(engine.debug_get_memory_sample(0, index), 0.0);
        }
    }

    #[test]
    fn test_latch_freezes_the_scan_offset() {
        let params = EngineParams {
            auto_scan_rate: 3.0,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 2.0, &params);
        run(&mut engine, &[0.0; 300], &[0.0; 300]);
        let frozen = engine.last_offset;

        engine.set_latch(true);
        run(&mut engine, &[0.0; 300], &[0.0; 300]);
        assert_eq!(engine.last_offset, frozen);
    }

    #[test]
    fn test_scan_source_switch_glides() {
        let params = EngineParams {
            scan: 0.3,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 2.0, &params);
        run(&mut engine, &[0.0; 10], &[0.0; 10]);
        assert_eq!(engine.last_offset, 0.3);

        engine.set_auto_scan_rate(1.0);
        run(&mut engine, &[0.0], &[0.0]);
        assert!(
            (engine.last_offset - 0.3).abs() < 0.01,
            "offset jumped to {}",
            engine.last_offset
        );
    }

    #[test]
    fn test_window_change_crossfades() {
        let mut engine = prepared(1000.0, 2.0, &EngineParams {
            scan: 1.0,
            ..quiet_params()
        });
        assert_eq!(engine.window_length(), 2.0);

        engine.set_time(1.0);
        assert!(engine.window.is_active());
        run(&mut engine, &[0.0; 50], &[0.0; 50]);
        assert!(!engine.window.is_active());
        assert_eq!(engine.window_length(), 1.0);
    }

    #[test]
    fn test_tape_motion_stays_in_tape_window() {
        let params = EngineParams {
            tape_mode: true,
            time: 2.0,
            tape_window: 1.0,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 4.0, &params);
        let handle = engine.visual_handle();
        let mut frame = VisualFrame::default();
        let mut positions = Vec::new();

        for _ in 0..(20_000 / BLOCK) {
            run(&mut engine, &[0.0; BLOCK], &[0.0; BLOCK]);
            handle.load_into(&mut frame);
            // One second of a four second memory.
            assert!(frame.primary_position <= 0.25 + 1e-4);
            positions.push(frame.primary_position);
        }

        positions.dedup();
        assert!(positions.len() > 2, "tape head never moved");
    }

    #[test]
    fn test_transport_rewind_reseeds() {
        let params = EngineParams {
            seed: 42,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 1.0, &params);
        engine.set_transport_position(0, true);
        run(&mut engine, &[0.0; 64], &[0.0; 64]);
        engine.set_transport_position(64, true);
        run(&mut engine, &[0.0; 64], &[0.0; 64]);

        engine.set_transport_position(0, true);
        let empty: [f32; 0] = [];
        let (mut out_l, mut out_r) = (empty, empty);
        engine.process_block([&empty[..], &empty[..]], [&mut out_l[..], &mut out_r[..]]);

        let mut expected = RandomGenerator::default();
        expected.reseed(42, 0);
        assert_eq!(engine.rng.next_u32(), expected.next_u32());
    }

    /// Play `blocks` with the transport running and collect the scan offset
    /// at the end of each block.
    fn play_blocks(
        engine: &mut MemoryDelayEngine,
        blocks: std::ops::Range<usize>,
        input: &[f32],
    ) -> Vec<f32> {
        blocks
            .map(|block| {
                engine.set_transport_position((block * BLOCK) as i64, true);
                run(engine, input, input);
                engine.last_offset
            })
            .collect()
    }

    fn assert_restart_replays_modulation(params: &EngineParams) {
        const SAMPLE_RATE: f64 = 8000.0;
        const PLAYED: usize = 200;

        let mut fresh = prepared(SAMPLE_RATE, 4.0, params);
        let expected = play_blocks(&mut fresh, 0..PLAYED, &noise(12, BLOCK));

        // Stop somewhere in the middle, then play again from the top with
        // different audio.
        let input = noise(13, BLOCK);
        let mut restarted = prepared(SAMPLE_RATE, 4.0, params);
        play_blocks(&mut restarted, 0..37, &input);
        restarted.set_transport_position(37 * BLOCK as i64, false);
        run(&mut restarted, &input, &input);
        let actual = play_blocks(&mut restarted, 0..PLAYED, &input);

        // The heads glide out of where they stopped; after that the traces
        // are identical.
        let glide = ramp_samples(SCAN_GLIDE_SECONDS, SAMPLE_RATE as f32) as usize;
        for block in glide.div_ceil(BLOCK)..PLAYED {
            assert_eq!(
                actual[block].to_bits(),
                expected[block].to_bits(),
                "block {block}: {} vs {}",
                actual[block],
                expected[block]
            );
        }
        assert_eq!(restarted.rng.next_u32(), fresh.rng.next_u32());
    }

    #[test]
    fn test_restart_replays_auto_scan_trace() {
        assert_restart_replays_modulation(&EngineParams {
            auto_scan_rate: 0.7,
            character: 0.8,
            seed: 42,
            ..EngineParams::default()
        });
    }

    #[test]
    fn test_restart_replays_tape_motion() {
        assert_restart_replays_modulation(&EngineParams {
            tape_mode: true,
            tape_window: 0.5,
            character: 0.8,
            seed: 42,
            ..EngineParams::default()
        });
    }

    #[test]
    fn test_feed_mode_recirculates_the_wet_read() {
        let params = EngineParams {
            mix: 0.0,
            feedback: 0.5,
            feedback_mode: FeedbackMode::Feed,
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        let (out_l, _) = run(&mut engine, &[0.5, 0.0], &[0.5, 0.0]);

        let first = 0.5_f32.tanh();
        assert_eq!(out_l, [0.5, 0.0]);
        assert_eq!(engine.debug_get_memory_sample(0, 0), first);
        // Nothing is heard at mix 0, yet the read still comes back around.
        assert_eq!(engine.debug_get_memory_sample(0, 1), (first * 0.5).tanh());
    }

    #[test]
    fn test_closed_mode_recirculates_the_output() {
        let params = EngineParams {
            mix: 0.0,
            feedback: 0.5,
            feedback_mode: FeedbackMode::Closed,
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        run(&mut engine, &[0.5, 0.0], &[0.5, 0.0]);

        // At mix 0 the output is the dry signal, so that is what loops.
        assert_eq!(engine.debug_get_memory_sample(0, 0), (0.5_f32 + 0.5 * 0.5).tanh());
        assert_eq!(engine.debug_get_memory_sample(0, 1), 0.0);
    }

    fn driven(routing: BankRouting) -> BankSettings {
        BankSettings {
            routing,
            gain: 0.0,
            drive: 1.0,
            tone: 0.0,
        }
    }

    fn drive_curve(x: f32) -> f32 {
        (x * 3.0).tanh() / 3.0_f32.tanh()
    }

    #[test]
    fn test_in_bank_shapes_only_the_recording() {
        let params = EngineParams {
            mix: 1.0,
            bank_a: driven(BankRouting::In),
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        let (out_l, _) = run(&mut engine, &[0.5, 0.0], &[0.5, 0.0]);

        let recorded = engine.debug_get_memory_sample(0, 0);
        assert_eq!(recorded, drive_curve(0.5).tanh());
        assert_eq!(out_l[1], recorded);
    }

    #[test]
    fn test_out_bank_shapes_only_the_playback() {
        let params = EngineParams {
            mix: 1.0,
            bank_a: driven(BankRouting::Out),
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        let (out_l, _) = run(&mut engine, &[0.5, 0.0], &[0.5, 0.0]);

        let recorded = engine.debug_get_memory_sample(0, 0);
        assert_eq!(recorded, 0.5_f32.tanh());
        assert_eq!(out_l[1], drive_curve(recorded));
    }

    #[test]
    fn test_feed_bank_shapes_only_the_recirculation() {
        let params = EngineParams {
            mix: 1.0,
            feedback: 0.5,
            feedback_mode: FeedbackMode::Feed,
            bank_b: driven(BankRouting::Feed),
            ..quiet_params()
        };
        let mut engine = prepared(100.0, 1.0, &params);
        let (out_l, _) = run(&mut engine, &[0.5, 0.0], &[0.5, 0.0]);

        let first = 0.5_f32.tanh();
        assert_eq!(engine.debug_get_memory_sample(0, 0), first);
        assert_eq!(out_l[1], first);
        assert_eq!(engine.debug_get_memory_sample(0, 1), drive_curve(first * 0.5).tanh());
    }

    #[test]
    fn test_mono_in_place_averages_both_sides() {
        let params = EngineParams {
            mix: 0.0,
            ..quiet_params()
        };
        let mut engine = prepared(1000.0, 1.0, &params);
        let mut buffer = [0.2, -0.4, 0.6];

        engine.process_in_place(&mut [&mut buffer[..]]);
        assert_eq!(buffer, [0.2, -0.4, 0.6]);
        assert_eq!(engine.debug_get_memory_sample(1, 2), 0.6_f32.tanh());
    }

    #[test]
    fn test_visual_snapshot_tracks_energy() {
        let params = EngineParams {
            mix: 1.0,
            ..quiet_params()
        };
        let mut engine = prepared(1280.0, 1.0, &params);
        run(&mut engine, &[0.8; 640], &[0.8; 640]);

        let mut frame = VisualFrame::default();
        engine.get_visual_snapshot(&mut frame);
        assert_eq!(frame.write_index, 640);
        assert_eq!(frame.write_bin, 64);
        assert!(frame.energy[..64].iter().any(|&e| e > 0.0));
        assert!(frame.energy[64..].iter().all(|&e| e == 0.0));
    }
}
