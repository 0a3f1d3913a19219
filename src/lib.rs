use nih_plug::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;

pub mod analysis;
pub mod dsp;
mod editor;
pub mod engine;
pub mod error;
pub mod params;

use dsp::NUM_BANDS;
use engine::{EqProcessor, EqShared};
use params::EqParams;

/// Placeholder rate until the host calls `initialize`
const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// ParametricEq - 8 band equalizer with a live spectrum display
pub struct ParametricEq {
    params: Arc<EqParams>,

    /// Coefficient cache, response curve and analyzer slot, shared with the editor
    shared: Arc<EqShared>,

    /// Filter bank and analyzer feed (audio thread only)
    processor: EqProcessor,
}

impl Default for ParametricEq {
    fn default() -> Self {
        let shared = Arc::new(EqShared::new(NUM_BANDS, DEFAULT_SAMPLE_RATE));

        Self {
            params: Arc::new(EqParams::new(shared.cache().clone())),
            processor: EqProcessor::new(shared.clone()),
            shared,
        }
    }
}

impl Plugin for ParametricEq {
    const NAME: &'static str = "ParametricEq";
    const VENDOR: &'static str = "ParametricEq";
    const URL: &'static str = "https://github.com/your/param-eq";
    const EMAIL: &'static str = "your@email.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const MIDI_OUTPUT: MidiConfig = MidiConfig::None;

    // Coefficients are picked up once per block
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn editor(&mut self, _async_executor: AsyncExecutor<Self>) -> Option<Box<dyn Editor>> {
        editor::create(self.params.clone(), self.shared.clone())
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let num_channels = audio_io_layout
            .main_output_channels
            .map_or(0, NonZeroU32::get) as usize;
        let sample_rate = buffer_config.sample_rate as f64;
        let max_block_size = buffer_config.max_buffer_size as usize;

        nih_log!(
            "Preparing {} channels at {} Hz, blocks up to {} samples",
            num_channels,
            sample_rate,
            max_block_size
        );
        self.processor
            .prepare(sample_rate, max_block_size, num_channels);

        true
    }

    fn reset(&mut self) {
        self.processor.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.processor.process(buffer.as_slice(), self.params.as_ref());

        ProcessStatus::Normal
    }
}

impl Vst3Plugin for ParametricEq {
    const VST3_CLASS_ID: [u8; 16] = *b"ParamEqPlugin001";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Eq];
}

nih_export_vst3!(ParametricEq);
