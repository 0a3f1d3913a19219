//! State shared between the audio thread and the editor
//!
//! The coefficient cache (and its dirty flags), the cached response curve,
//! and the analyzer attach point. The parameter store writes only to the
//! dirty flags; the editor polls the two read accessors.

use std::sync::Arc;

use crate::analysis::{AnalyzerRegistration, AnalyzerSlot, SpectrumAnalyzer};
use crate::dsp::cache::CoefficientCache;
use crate::dsp::curve::ResponseCurve;
use crate::dsp::BandSource;

pub struct EqShared {
    cache: Arc<CoefficientCache>,
    curve: ResponseCurve,
    analyzer: Arc<AnalyzerSlot>,
}

impl EqShared {
    pub fn new(num_bands: usize, sample_rate: f64) -> Self {
        let cache = Arc::new(CoefficientCache::new(num_bands, sample_rate));
        Self {
            curve: ResponseCurve::new(cache.clone()),
            cache,
            analyzer: Arc::new(AnalyzerSlot::new()),
        }
    }

    pub fn cache(&self) -> &Arc<CoefficientCache> {
        &self.cache
    }

    pub fn curve(&self) -> &ResponseCurve {
        &self.curve
    }

    pub fn analyzer_slot(&self) -> &Arc<AnalyzerSlot> {
        &self.analyzer
    }

    /// Parameter change notification for one band
    pub fn mark_dirty(&self, band: usize) {
        self.cache.mark_dirty(band);
    }

    pub fn attach_analyzer(&self, analyzer: Arc<SpectrumAnalyzer>) {
        self.analyzer.attach(analyzer);
    }

    pub fn detach_analyzer(&self) -> Option<Arc<SpectrumAnalyzer>> {
        self.analyzer.detach()
    }

    /// Attach for as long as the returned guard lives
    pub fn register_analyzer(&self, analyzer: Arc<SpectrumAnalyzer>) -> AnalyzerRegistration {
        self.analyzer.register(analyzer)
    }

    /// Latest spectrum in dB, or `None` while no analyzer is attached
    pub fn spectrum_frame(&self) -> Option<Vec<f32>> {
        self.analyzer
            .with_attached_blocking(SpectrumAnalyzer::spectrum_frame)
    }

    /// Combined EQ response in dB at `num_points` log-spaced frequencies
    pub fn eq_curve<S>(&self, num_points: usize, source: &S) -> Vec<f32>
    where
        S: BandSource + ?Sized,
    {
        self.curve.get(num_points, source)
    }
}
