use nih_plug::prelude::*;
use nih_plug_egui::EguiState;
use std::sync::Arc;

use crate::dsp::cache::CoefficientCache;
use crate::dsp::{BandLayout, BandSnapshot, BandSource, FilterType, MAX_FREQUENCY, MIN_FREQUENCY, NUM_BANDS};

/// Starting frequency of each band, spread across the audible range
const DEFAULT_FREQUENCIES: [f32; NUM_BANDS] = [
    60.0, 150.0, 400.0, 1000.0, 2500.0, 5000.0, 10000.0, 16000.0,
];

/// Plugin parameters
#[derive(Params)]
pub struct EqParams {
    /// Editor state (window size, etc.)
    #[persist = "editor-state"]
    pub editor_state: Arc<EguiState>,

    /// Ids come out as `freq_1`, `gain_1`, ... `type_8`
    #[nested(array, group = "Band")]
    pub bands: [BandParams; NUM_BANDS],
}

#[derive(Params)]
pub struct BandParams {
    /// Center or corner frequency in Hz
    #[id = "freq"]
    pub frequency: FloatParam,

    /// Gain in dB (ignored by the pass filters)
    #[id = "gain"]
    pub gain: FloatParam,

    #[id = "q"]
    pub q: FloatParam,

    /// Index into `layout.allowed()`
    #[id = "type"]
    pub filter_type: IntParam,

    pub layout: BandLayout,
}

impl EqParams {
    /// Every band parameter flags its band in `cache` when it changes
    pub fn new(cache: Arc<CoefficientCache>) -> Self {
        Self {
            editor_state: EguiState::from_size(900, 560),
            bands: std::array::from_fn(|index| BandParams::new(index, cache.clone())),
        }
    }
}

impl BandParams {
    fn new(index: usize, cache: Arc<CoefficientCache>) -> Self {
        let layout = BandLayout::for_band(index, NUM_BANDS);

        let on_float: Arc<dyn Fn(f32) + Send + Sync> = {
            let cache = cache.clone();
            Arc::new(move |_: f32| cache.mark_dirty(index))
        };
        let on_int: Arc<dyn Fn(i32) + Send + Sync> = Arc::new(move |_: i32| cache.mark_dirty(index));

        Self {
            frequency: FloatParam::new(
                "Frequency",
                DEFAULT_FREQUENCIES[index],
                FloatRange::Skewed {
                    min: MIN_FREQUENCY,
                    max: MAX_FREQUENCY,
                    factor: FloatRange::skew_factor(-2.0), // Log-like taper
                },
            )
            .with_unit(" Hz")
            .with_value_to_string(formatters::v2s_f32_hz_then_khz(2))
            .with_string_to_value(formatters::s2v_f32_hz_then_khz())
            .with_callback(on_float.clone()),

            gain: FloatParam::new("Gain", 0.0, FloatRange::Linear { min: -12.0, max: 12.0 })
                .with_step_size(0.1)
                .with_unit(" dB")
                .with_value_to_string(formatters::v2s_f32_rounded(1))
                .with_callback(on_float.clone()),

            q: FloatParam::new(
                "Q",
                1.0,
                FloatRange::Skewed {
                    min: 0.1,
                    max: 7.0,
                    factor: FloatRange::skew_factor(-1.0), // More resolution at low Q
                },
            )
            .with_step_size(0.01)
            .with_value_to_string(formatters::v2s_f32_rounded(2))
            .with_callback(on_float),

            filter_type: IntParam::new(
                "Type",
                0,
                IntRange::Linear {
                    min: 0,
                    max: layout.allowed().len() as i32 - 1,
                },
            )
            .with_value_to_string(Arc::new(move |choice: i32| layout.resolve(choice).name().to_string()))
            .with_string_to_value(Arc::new(move |text: &str| {
                let text = text.trim();
                layout
                    .allowed()
                    .iter()
                    .position(|filter_type| filter_type.name().eq_ignore_ascii_case(text))
                    .map(|position| position as i32)
            }))
            .with_callback(on_int),

            layout,
        }
    }

    pub fn selected_type(&self) -> FilterType {
        self.layout.resolve(self.filter_type.value())
    }

    pub fn snapshot(&self) -> BandSnapshot {
        BandSnapshot::new(
            self.selected_type(),
            self.frequency.value(),
            self.q.value(),
            self.gain.value(),
        )
    }
}

impl BandSource for EqParams {
    fn num_bands(&self) -> usize {
        self.bands.len()
    }

    fn band(&self, index: usize) -> BandSnapshot {
        self.bands
            .get(index)
            .map(BandParams::snapshot)
            .unwrap_or_default()
    }
}
