//! Combined Magnitude Response
//!
//! Evaluates the product of every active band's |H(f)| at log-spaced points
//! between 20 Hz and 20 kHz, in dB. The result is cached and only rebuilt
//! when the coefficient cache revision moves, a band publishes a new set, or
//! the resolution changes.

use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::CoefficientCache;
use super::coefficients::CoefficientSet;
use super::{log_position_to_freq, BandSource};

struct CurveState {
    points: Vec<f32>,
    /// Cache revision the points were built from
    revision: Option<u64>,
    /// Last coefficients seen per band, the fallback during a concurrent publish
    coeffs: Vec<CoefficientSet>,
    /// Published version each band's contribution was built from
    versions: Vec<Option<u32>>,
}

pub struct ResponseCurve {
    cache: Arc<CoefficientCache>,
    state: Mutex<CurveState>,
}

impl ResponseCurve {
    pub fn new(cache: Arc<CoefficientCache>) -> Self {
        let num_bands = cache.num_bands();
        Self {
            cache,
            state: Mutex::new(CurveState {
                points: Vec::new(),
                revision: None,
                coeffs: vec![CoefficientSet::UNITY; num_bands],
                versions: vec![None; num_bands],
            }),
        }
    }

    /// True if the next read will rebuild the curve
    pub fn needs_update(&self, num_points: usize) -> bool {
        let state = self.state.lock();
        self.is_stale(&state, self.cache.revision(), num_points)
    }

    fn is_stale(&self, state: &CurveState, revision: u64, num_points: usize) -> bool {
        state.revision != Some(revision)
            || state.points.len() != num_points
            || state
                .versions
                .iter()
                .enumerate()
                .any(|(band, &version)| version.is_none() || version != self.cache.version(band))
    }

    /// Combined response in dB at `num_points` log-spaced frequencies
    pub fn get<S>(&self, num_points: usize, source: &S) -> Vec<f32>
    where
        S: BandSource + ?Sized,
    {
        self.with_points(num_points, source, <[f32]>::to_vec)
    }

    /// Borrow the cached curve, rebuilding it first if it is stale
    pub fn with_points<S, R>(&self, num_points: usize, source: &S, f: impl FnOnce(&[f32]) -> R) -> R
    where
        S: BandSource + ?Sized,
    {
        let mut state = self.state.lock();

        // Read before evaluating: a change landing mid-build forces another rebuild
        let revision = self.cache.revision();
        if self.is_stale(&state, revision, num_points) {
            let CurveState {
                points,
                coeffs,
                versions,
                ..
            } = &mut *state;
            points.resize(num_points, 0.0);
            self.evaluate(source, coeffs, versions, points);
            state.revision = Some(revision);
        }

        f(&state.points)
    }

    /// Response of a single band in dB, uncached
    pub fn band_curve<S>(&self, band: usize, num_points: usize, source: &S) -> Vec<f32>
    where
        S: BandSource + ?Sized,
    {
        let sample_rate = self.cache.sample_rate();
        let fallback = self.state.lock().coeffs.get(band).copied().unwrap_or_default();
        let coeffs = self.cache.get_or_recompute(band, source, fallback);

        (0..num_points)
            .map(|i| {
                let freq = point_frequency(i, num_points) as f64;
                coeffs.magnitude_db_at(freq, sample_rate) as f32
            })
            .collect()
    }

    fn evaluate<S>(
        &self,
        source: &S,
        coeffs: &mut [CoefficientSet],
        versions: &mut [Option<u32>],
        points: &mut [f32],
    ) where
        S: BandSource + ?Sized,
    {
        let sample_rate = self.cache.sample_rate();

        let mut active = Vec::with_capacity(coeffs.len());
        for (band, (last, version)) in coeffs.iter_mut().zip(versions.iter_mut()).enumerate() {
            if source.band(band).is_bypassed() {
                *version = self.cache.version(band);
                continue;
            }

            let (current, used) = self.cache.get_or_recompute_versioned(band, source, *last);
            *last = current;
            *version = used;
            active.push(current);
        }

        let num_points = points.len();
        for (i, point) in points.iter_mut().enumerate() {
            let freq = point_frequency(i, num_points) as f64;
            let magnitude: f64 = active
                .iter()
                .map(|band| band.magnitude_at(freq, sample_rate))
                .product();
            *point = (20.0 * magnitude.max(1e-12).log10()) as f32;
        }
    }
}

/// Frequency of point `i` out of `num_points` on the 20 Hz..20 kHz log axis
pub fn point_frequency(i: usize, num_points: usize) -> f32 {
    let t = if num_points > 1 {
        i as f32 / (num_points - 1) as f32
    } else {
        0.0
    };
    log_position_to_freq(t)
}
