//! Equalizer DSP Core
//!
//! Band model shared by the audio path and the editor, biquad coefficient
//! design and caching, the serial filter bank, and the combined response curve.

pub mod cache;
pub mod coefficients;
pub mod curve;
pub mod filter_bank;

/// Number of equalizer bands
pub const NUM_BANDS: usize = 8;

/// Lower edge of the audible range used for display and curve evaluation
pub const MIN_FREQUENCY: f32 = 20.0;

/// Upper edge of the audible range used for display and curve evaluation
pub const MAX_FREQUENCY: f32 = 20000.0;

/// Gain-carrying bands closer to 0 dB than this are treated as inactive
pub const BYPASS_GAIN_DB: f32 = 0.1;

/// Biquad filter shape for one band
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterType {
    Peak,
    LowShelf,
    HighShelf,
    LowPass,
    HighPass,
}

impl FilterType {
    pub const ALL: [FilterType; 5] = [
        FilterType::Peak,
        FilterType::LowShelf,
        FilterType::HighShelf,
        FilterType::LowPass,
        FilterType::HighPass,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterType::Peak => "Peak",
            FilterType::LowShelf => "Low Shelf",
            FilterType::HighShelf => "High Shelf",
            FilterType::LowPass => "Low Pass",
            FilterType::HighPass => "High Pass",
        }
    }

    /// Pass filters have no gain control and always apply
    pub fn has_gain(self) -> bool {
        !matches!(self, FilterType::LowPass | FilterType::HighPass)
    }
}

/// Immutable read of one band's parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandSnapshot {
    pub frequency_hz: f32,
    pub gain_db: f32,
    pub q: f32,
    pub filter_type: FilterType,
}

impl BandSnapshot {
    pub fn new(filter_type: FilterType, frequency_hz: f32, q: f32, gain_db: f32) -> Self {
        Self {
            frequency_hz,
            gain_db,
            q,
            filter_type,
        }
    }

    pub fn peak(frequency_hz: f32, q: f32, gain_db: f32) -> Self {
        Self::new(FilterType::Peak, frequency_hz, q, gain_db)
    }

    /// True when the band contributes nothing and can be skipped
    pub fn is_bypassed(&self) -> bool {
        self.filter_type.has_gain() && self.gain_db.abs() < BYPASS_GAIN_DB
    }
}

impl Default for BandSnapshot {
    fn default() -> Self {
        Self::peak(1000.0, 1.0, 0.0)
    }
}

/// Read access to the current band parameters.
///
/// Implemented by the plugin's parameter store and by plain snapshot slices.
/// Consumers call `band` right before they need the values, so a read never
/// predates the dirty flag it is answering.
pub trait BandSource {
    fn num_bands(&self) -> usize;

    fn band(&self, index: usize) -> BandSnapshot;
}

impl BandSource for [BandSnapshot] {
    fn num_bands(&self) -> usize {
        self.len()
    }

    fn band(&self, index: usize) -> BandSnapshot {
        self.get(index).copied().unwrap_or_default()
    }
}

impl<const N: usize> BandSource for [BandSnapshot; N] {
    fn num_bands(&self) -> usize {
        N
    }

    fn band(&self, index: usize) -> BandSnapshot {
        self.as_slice().band(index)
    }
}

const ALL_TYPES: &[FilterType] = &FilterType::ALL;
const EDGE_LOW_TYPES: &[FilterType] = &[FilterType::Peak, FilterType::LowShelf, FilterType::HighPass];
const EDGE_HIGH_TYPES: &[FilterType] = &[FilterType::Peak, FilterType::HighShelf, FilterType::LowPass];

/// The filter types one band offers, in selector order.
///
/// The type selector is an index into this list; the lowest band cannot pick
/// a low-pass and the highest band cannot pick a high-pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandLayout {
    allowed: &'static [FilterType],
}

impl BandLayout {
    pub fn for_band(index: usize, num_bands: usize) -> Self {
        let allowed = if num_bands <= 1 {
            ALL_TYPES
        } else if index == 0 {
            EDGE_LOW_TYPES
        } else if index + 1 == num_bands {
            EDGE_HIGH_TYPES
        } else {
            ALL_TYPES
        };

        Self { allowed }
    }

    pub fn allowed(&self) -> &'static [FilterType] {
        self.allowed
    }

    /// Resolve a selector index, clamping out-of-range values
    pub fn resolve(&self, choice: i32) -> FilterType {
        let last = self.allowed.len() - 1;
        let index = usize::try_from(choice).unwrap_or(0).min(last);
        self.allowed[index]
    }

    pub fn index_of(&self, filter_type: FilterType) -> Option<usize> {
        self.allowed.iter().position(|&t| t == filter_type)
    }
}

/// Map a frequency to its 0..1 position on the log axis
pub fn freq_to_log_position(freq: f32) -> f32 {
    (freq / MIN_FREQUENCY).log10() / (MAX_FREQUENCY / MIN_FREQUENCY).log10()
}

/// Map a 0..1 log-axis position back to a frequency
pub fn log_position_to_freq(t: f32) -> f32 {
    let min = MIN_FREQUENCY.log10();
    let max = MAX_FREQUENCY.log10();
    10.0_f32.powf(min + t * (max - min))
}
