//! Biquad Coefficient Design
//!
//! Audio EQ Cookbook (RBJ) formulas for the five band shapes, normalised so
//! that a0 == 1. Coefficients are designed and stored in f64; low bands at
//! high sample rates lose too much precision in f32.

use realfft::num_complex::Complex64;
use std::f64::consts::PI;

use super::{BandSnapshot, FilterType};

const MIN_Q: f64 = 0.025;
const MAX_Q: f64 = 40.0;
const MAX_GAIN_DB: f64 = 48.0;

/// Floor applied when converting silence to decibels
pub const SILENCE_DB: f32 = -100.0;

/// Second-order IIR coefficients, normalised by a0
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoefficientSet {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for CoefficientSet {
    fn default() -> Self {
        Self::UNITY
    }
}

impl CoefficientSet {
    /// Unity gain passthrough
    pub const UNITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Design the coefficients for one band.
    ///
    /// Out-of-range inputs are clamped: frequency into (1 Hz, 0.499 * fs),
    /// Q into [0.025, 40] and gain into +/-48 dB.
    pub fn design(sample_rate: f64, band: &BandSnapshot) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 2.0 {
            sample_rate
        } else {
            44100.0
        };
        let freq = sanitize(band.frequency_hz as f64, 1000.0).clamp(1.0, sample_rate * 0.499);
        let q = sanitize(band.q as f64, 1.0).clamp(MIN_Q, MAX_Q);
        let gain_db = sanitize(band.gain_db as f64, 0.0).clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        let gain = 10.0_f64.powf(gain_db / 20.0);

        match band.filter_type {
            FilterType::Peak => Self::peak(sample_rate, freq, q, gain),
            FilterType::LowShelf => Self::low_shelf(sample_rate, freq, q, gain),
            FilterType::HighShelf => Self::high_shelf(sample_rate, freq, q, gain),
            FilterType::LowPass => Self::low_pass(sample_rate, freq, q),
            FilterType::HighPass => Self::high_pass(sample_rate, freq, q),
        }
    }

    /// Peaking filter; `gain` is linear amplitude
    pub fn peak(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.sqrt();
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalize(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    pub fn low_shelf(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.sqrt();
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let a_plus_1 = a + 1.0;
        let a_minus_1 = a - 1.0;
        let two_sqrt_a_alpha = a.sqrt() * w0.sin() / q;

        Self::normalize(
            a * (a_plus_1 - a_minus_1 * cos_w0 + two_sqrt_a_alpha),
            2.0 * a * (a_minus_1 - a_plus_1 * cos_w0),
            a * (a_plus_1 - a_minus_1 * cos_w0 - two_sqrt_a_alpha),
            a_plus_1 + a_minus_1 * cos_w0 + two_sqrt_a_alpha,
            -2.0 * (a_minus_1 + a_plus_1 * cos_w0),
            a_plus_1 + a_minus_1 * cos_w0 - two_sqrt_a_alpha,
        )
    }

    pub fn high_shelf(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.sqrt();
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let a_plus_1 = a + 1.0;
        let a_minus_1 = a - 1.0;
        let two_sqrt_a_alpha = a.sqrt() * w0.sin() / q;

        Self::normalize(
            a * (a_plus_1 + a_minus_1 * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * (a_minus_1 + a_plus_1 * cos_w0),
            a * (a_plus_1 + a_minus_1 * cos_w0 - two_sqrt_a_alpha),
            a_plus_1 - a_minus_1 * cos_w0 + two_sqrt_a_alpha,
            2.0 * (a_minus_1 - a_plus_1 * cos_w0),
            a_plus_1 - a_minus_1 * cos_w0 - two_sqrt_a_alpha,
        )
    }

    pub fn low_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalize(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    pub fn high_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        Self::normalize(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Linear magnitude |H(e^jw)| at `freq`
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let numerator = self.b0 + z1 * self.b1 + z2 * self.b2;
        let denominator = 1.0 + z1 * self.a1 + z2 * self.a2;

        let den = denominator.norm();
        if den > 0.0 {
            numerator.norm() / den
        } else {
            0.0
        }
    }

    pub fn magnitude_db_at(&self, freq: f64, sample_rate: f64) -> f64 {
        20.0 * self.magnitude_at(freq, sample_rate).max(1e-12).log10()
    }

    pub(crate) fn to_words(self) -> [u64; 5] {
        [
            self.b0.to_bits(),
            self.b1.to_bits(),
            self.b2.to_bits(),
            self.a1.to_bits(),
            self.a2.to_bits(),
        ]
    }

    pub(crate) fn from_words(words: [u64; 5]) -> Self {
        Self {
            b0: f64::from_bits(words[0]),
            b1: f64::from_bits(words[1]),
            b2: f64::from_bits(words[2]),
            a1: f64::from_bits(words[3]),
            a2: f64::from_bits(words[4]),
        }
    }
}

fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, never going below `SILENCE_DB`
pub fn gain_to_db(gain: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_peak_hits_gain_at_center() {
        for &freq in &[40.0_f32, 250.0, 1000.0, 4000.0, 15000.0] {
            for &q in &[0.1_f32, 0.707, 1.0, 4.0, 7.0] {
                for &gain_db in &[-12.0_f32, -3.0, 0.5, 6.0, 12.0] {
                    let coeffs = CoefficientSet::design(SR, &BandSnapshot::peak(freq, q, gain_db));
                    let db = coeffs.magnitude_db_at(freq as f64, SR);
                    assert!(
                        (db - gain_db as f64).abs() < 1e-3,
                        "peak {freq} Hz q={q} gain={gain_db}: got {db}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_shelves_reach_gain() {
        let low = CoefficientSet::design(
            SR,
            &BandSnapshot::new(FilterType::LowShelf, 200.0, 0.707, 9.0),
        );
        assert!((low.magnitude_db_at(5.0, SR) - 9.0).abs() < 0.1);
        assert!(low.magnitude_db_at(15000.0, SR).abs() < 0.1);

        let high = CoefficientSet::design(
            SR,
            &BandSnapshot::new(FilterType::HighShelf, 2000.0, 0.707, -6.0),
        );
        assert!((high.magnitude_db_at(23000.0, SR) + 6.0).abs() < 0.1);
        assert!(high.magnitude_db_at(30.0, SR).abs() < 0.1);
    }

    #[test]
    fn test_pass_filters_ignore_gain() {
        let quiet = CoefficientSet::design(
            SR,
            &BandSnapshot::new(FilterType::LowPass, 500.0, 0.707, 0.0),
        );
        let loud = CoefficientSet::design(
            SR,
            &BandSnapshot::new(FilterType::LowPass, 500.0, 0.707, 12.0),
        );
        assert_eq!(quiet, loud);

        // Butterworth corner sits 3 dB down
        assert!((quiet.magnitude_db_at(500.0, SR) + 3.01).abs() < 0.05);

        let hp = CoefficientSet::design(
            SR,
            &BandSnapshot::new(FilterType::HighPass, 200.0, 0.707, -12.0),
        );
        assert!((hp.magnitude_db_at(200.0, SR) + 3.01).abs() < 0.05);
        assert!(hp.magnitude_db_at(10000.0, SR).abs() < 0.01);
    }

    #[test]
    fn test_clamps_near_nyquist() {
        let coeffs = CoefficientSet::design(SR, &BandSnapshot::peak(30000.0, 0.0, 6.0));
        for value in [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2] {
            assert!(value.is_finite());
        }

        let nan = CoefficientSet::design(SR, &BandSnapshot::peak(f32::NAN, f32::NAN, f32::NAN));
        assert!(nan.b0.is_finite());
    }

    #[test]
    fn test_words_roundtrip_exact() {
        let coeffs = CoefficientSet::design(SR, &BandSnapshot::peak(1234.0, 2.0, -4.5));
        assert_eq!(CoefficientSet::from_words(coeffs.to_words()), coeffs);
    }

    #[test]
    fn test_gain_to_db_floor() {
        assert_eq!(gain_to_db(0.0), SILENCE_DB);
        assert!((gain_to_db(db_to_gain(-6.0)) + 6.0).abs() < 1e-4);
    }
}
