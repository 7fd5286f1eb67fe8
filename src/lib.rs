//! # Echoform: A Stereo Memory Delay (AU/VST3/CLAP)
//!
//! A tape-style "memory" delay built with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug). Everything that comes
//! in is recorded into a three minute stereo history; two read heads play it
//! back from a scannable window, a lo-fi modifier chain colors it, and part
//! of the result is recirculated into the history.
//!
//! ## Layout
//!
//! - [`dsp`]: primitives (ring buffer, read heads, random generator,
//!   modifiers, filters).
//! - [`engine`]: the per-sample state machine, independent of any plugin
//!   API so it can be driven from tests and offline tools.
//! - `params`: the host-facing parameter declarations.
//!
//! This file is only the shell: it forwards host state into the engine once
//! per block and reports the tail length back.

pub mod dsp;
pub mod engine;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use engine::{FeedbackMode, MemoryDelayEngine, COLLECT_DECAY};
use nih_plug::prelude::*;
use params::EchoformParams;

/// Length of the recorded history.
const MEMORY_SECONDS: f32 = 180.0;

/// Level, in dB, at which a decaying tail counts as gone.
const TAIL_FLOOR_DB: f32 = -60.0;

struct Echoform {
    params: Arc<EchoformParams>,

    /// Set in `initialize()`; used to turn the window length into a tail
    /// length in samples.
    sample_rate: f32,

    engine: MemoryDelayEngine,
}

impl Default for Echoform {
    fn default() -> Self {
        Self {
            params: Arc::new(EchoformParams::default()),
            sample_rate: 44100.0,
            // Unprepared: passes audio through until initialize() sizes it.
            engine: MemoryDelayEngine::new(),
        }
    }
}

impl Plugin for Echoform {
    const NAME: &'static str = "Echoform";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first; a mono track feeds both sides of the engine and gets
    // their average back.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // The engine takes one parameter snapshot per block, so splitting
    // blocks at automation points would only add overhead.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Allocate the memory. At 48 kHz three minutes of stereo `f32` is
    /// about 66 MB, which is why it happens here and never in `process()`.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;

        self.engine.set_parameters(&self.params.to_engine_params());
        self.engine.prepare(
            f64::from(buffer_config.sample_rate),
            buffer_config.max_buffer_size as usize,
            MEMORY_SECONDS,
        );

        if self.engine.max_samples() == 0 {
            nih_log!(
                "cannot allocate a memory at {} Hz, refusing this configuration",
                buffer_config.sample_rate
            );
            return false;
        }

        true
    }

    /// Playback stopped or the host re-initialized the plugin: forget the
    /// recorded history so old audio doesn't bleed into the next take.
    fn reset(&mut self) {
        self.engine.reset();
        nih_log!("memory cleared");
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let params = self.params.to_engine_params();
        self.engine.set_parameters(&params);

        let transport = context.transport();
        if let Some(position) = transport.pos_samples() {
            self.engine
                .set_transport_position(position, transport.playing);
        }

        self.engine.process_in_place(buffer.as_slice());

        ProcessStatus::Tail(tail_samples(
            self.engine.window_length(),
            params.feedback,
            params.feedback_mode,
            self.sample_rate,
        ))
    }
}

/// How long the memory keeps sounding after the input stops.
///
/// Each pass through the window is attenuated by the recirculation gain
/// `g`, so after `N` passes the level is `g^N`. Solving `g^N = -60 dB`:
///
/// ```text
/// N = -3 / log10(g)
/// ```
///
/// Collect mode recirculates through its fixed decay instead of the
/// feedback knob.
fn tail_samples(window_seconds: f32, feedback: f32, mode: FeedbackMode, sample_rate: f32) -> u32 {
    let gain = match mode {
        FeedbackMode::Collect => COLLECT_DECAY,
        FeedbackMode::Feed | FeedbackMode::Closed => feedback,
    };
    let window_samples = window_seconds * sample_rate;

    let passes = if gain > 0.001 {
        (TAIL_FLOOR_DB / 20.0) / gain.log10()
    } else {
        1.0
    };

    // `as` saturates, so a huge tail clamps to u32::MAX instead of wrapping.
    (passes.max(1.0) * window_samples) as u32
}

impl ClapPlugin for Echoform {
    const CLAP_ID: &'static str = "com.loveless-audio.echoform";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A stereo memory delay with scanning read heads and tape character");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for Echoform {
    const VST3_CLASS_ID: [u8; 16] = *b"EchoformMemDly01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

nih_export_clap!(Echoform);
nih_export_vst3!(Echoform);

// AUv2 entry point for Logic Pro, wrapping the CLAP export.
clap_wrapper::export_auv2!();
