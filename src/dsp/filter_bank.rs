//! Serial N-band filter bank
//!
//! One biquad stage per band, applied in ascending band order, in place.
//! Runs on the audio thread: per-channel state is sized in `prepare`,
//! `process` never allocates or waits on a lock.

use std::sync::Arc;

use nih_plug::nih_debug_assert;

use super::cache::CoefficientCache;
use super::coefficients::CoefficientSet;
use super::BandSource;

/// Direct Form I state for one channel
#[derive(Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    fn process(&mut self, input: f32, coeffs: &CoefficientSet) -> f32 {
        let x = input as f64;
        let y = coeffs.b0 * x + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y as f32
    }
}

struct FilterStage {
    /// Coefficients used for the last processed block
    coeffs: CoefficientSet,
    channels: Vec<BiquadState>,
}

impl FilterStage {
    fn new() -> Self {
        Self {
            coeffs: CoefficientSet::UNITY,
            channels: Vec::new(),
        }
    }
}

/// Chain of biquad stages, one per band
pub struct FilterBank {
    cache: Arc<CoefficientCache>,
    stages: Vec<FilterStage>,
    num_channels: usize,
}

impl FilterBank {
    pub fn new(cache: Arc<CoefficientCache>) -> Self {
        let stages = (0..cache.num_bands()).map(|_| FilterStage::new()).collect();
        Self {
            cache,
            stages,
            num_channels: 0,
        }
    }

    /// Size the per-channel state and zero it. Must run before `process`.
    pub fn prepare(&mut self, sample_rate: f64, num_channels: usize) {
        self.num_channels = num_channels;
        self.cache.set_sample_rate(sample_rate);

        for stage in &mut self.stages {
            stage.channels.clear();
            stage.channels.resize(num_channels, BiquadState::default());
            stage.coeffs = CoefficientSet::UNITY;
        }
    }

    /// Zero the filter memory without touching the configuration
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.channels.iter_mut().for_each(BiquadState::reset);
        }
    }

    /// Filter planar channel slices in place
    pub fn process<S>(&mut self, channels: &mut [&mut [f32]], source: &S)
    where
        S: BandSource + ?Sized,
    {
        nih_debug_assert!(channels.len() <= self.num_channels);

        for (index, stage) in self.stages.iter_mut().enumerate() {
            if source.band(index).is_bypassed() {
                continue;
            }

            stage.coeffs = self.cache.get_or_recompute(index, source, stage.coeffs);
            let coeffs = stage.coeffs;

            for (samples, state) in channels.iter_mut().zip(stage.channels.iter_mut()) {
                for sample in samples.iter_mut() {
                    *sample = state.process(*sample, &coeffs);
                }
            }
        }
    }

    /// Filter an interleaved buffer in place
    pub fn process_interleaved<S>(&mut self, samples: &mut [f32], num_channels: usize, source: &S)
    where
        S: BandSource + ?Sized,
    {
        nih_debug_assert!(num_channels <= self.num_channels);
        if num_channels == 0 {
            return;
        }

        for (index, stage) in self.stages.iter_mut().enumerate() {
            if source.band(index).is_bypassed() {
                continue;
            }

            stage.coeffs = self.cache.get_or_recompute(index, source, stage.coeffs);
            let coeffs = stage.coeffs;

            for frame in samples.chunks_exact_mut(num_channels) {
                for (sample, state) in frame.iter_mut().zip(stage.channels.iter_mut()) {
                    *sample = state.process(*sample, &coeffs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{BandSnapshot, FilterType};
    use std::f32::consts::PI;

    const SR: f64 = 48000.0;

    fn bank(num_bands: usize, channels: usize) -> FilterBank {
        let cache = Arc::new(CoefficientCache::new(num_bands, SR));
        let mut bank = FilterBank::new(cache);
        bank.prepare(SR, channels);
        bank
    }

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_flat_bands_are_bit_exact() {
        let mut bank = bank(3, 2);
        let bands = [
            BandSnapshot::peak(100.0, 1.0, 0.0),
            BandSnapshot::new(FilterType::LowShelf, 300.0, 0.7, 0.05),
            BandSnapshot::new(FilterType::HighShelf, 8000.0, 0.7, -0.09),
        ];

        let input = sine(997.0, 512);
        let mut left = input.clone();
        let mut right = input.clone();
        bank.process(&mut [left.as_mut_slice(), right.as_mut_slice()], &bands);

        assert_eq!(left, input);
        assert_eq!(right, input);
    }

    #[test]
    fn test_pass_filter_applies_at_zero_gain() {
        let mut bank = bank(1, 1);
        let bands = [BandSnapshot::new(FilterType::LowPass, 500.0, 0.707, 0.0)];

        let mut signal = sine(8000.0, 4800);
        bank.process(&mut [signal.as_mut_slice()], &bands);

        // 4 octaves above the corner, 12 dB/oct
        assert!(rms(&signal[2400..]) < 0.35 * 0.01);
    }

    #[test]
    fn test_peak_boost_measured() {
        let mut bank = bank(1, 1);
        let bands = [BandSnapshot::peak(1000.0, 1.0, 6.0)];

        let input = sine(1000.0, 9600);
        let mut output = input.clone();
        bank.process(&mut [output.as_mut_slice()], &bands);

        let ratio = rms(&output[4800..]) / rms(&input[4800..]);
        let db = 20.0 * ratio.log10();
        assert!((db - 6.0).abs() < 0.1, "measured {db} dB");
    }

    #[test]
    fn test_channels_have_independent_state() {
        let mut bank = bank(1, 2);
        let bands = [BandSnapshot::peak(1000.0, 1.0, 12.0)];

        let mut left = sine(1000.0, 256);
        let mut right = vec![0.0; 256];
        bank.process(&mut [left.as_mut_slice(), right.as_mut_slice()], &bands);

        assert!(right.iter().all(|&s| s == 0.0));
        assert!(left.iter().any(|&s| s.abs() > 0.5));
    }

    #[test]
    fn test_interleaved_matches_planar() {
        let bands = [
            BandSnapshot::new(FilterType::HighPass, 200.0, 0.707, 0.0),
            BandSnapshot::peak(3000.0, 2.0, -6.0),
        ];

        let left = sine(150.0, 512);
        let right = sine(2900.0, 512);

        let mut planar = bank(2, 2);
        let mut l = left.clone();
        let mut r = right.clone();
        planar.process(&mut [l.as_mut_slice(), r.as_mut_slice()], &bands);

        let mut interleaved = bank(2, 2);
        let mut frames: Vec<f32> = left.iter().zip(&right).flat_map(|(&a, &b)| [a, b]).collect();
        interleaved.process_interleaved(&mut frames, 2, &bands);

        for (i, frame) in frames.chunks_exact(2).enumerate() {
            assert_eq!(frame[0], l[i]);
            assert_eq!(frame[1], r[i]);
        }
    }

    #[test]
    fn test_reset_silences_state() {
        let mut bank = bank(1, 1);
        let bands = [BandSnapshot::peak(200.0, 4.0, 12.0)];

        let mut burst = sine(200.0, 512);
        bank.process(&mut [burst.as_mut_slice()], &bands);
        bank.reset();

        let mut silence = vec![0.0; 64];
        bank.process(&mut [silence.as_mut_slice()], &bands);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stays_finite() {
        let mut bank = bank(2, 1);
        let bands = [
            BandSnapshot::new(FilterType::LowShelf, 20.0, 0.1, 12.0),
            BandSnapshot::peak(19000.0, 7.0, 12.0),
        ];

        let mut signal = vec![0.5; 10000];
        bank.process(&mut [signal.as_mut_slice()], &bands);
        assert!(signal.iter().all(|s| s.is_finite()));
    }
}
