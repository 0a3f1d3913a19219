//! Attach point for the spectrum analyzer.
//!
//! The editor owns its analyzer and registers it here while it wants data.
//! The audio thread only ever `try_lock`s the slot, so it skips a block
//! instead of waiting if the editor is attaching or detaching right then.

use std::sync::Arc;

use nih_plug::nih_log;
use parking_lot::Mutex;

use super::spectrum::SpectrumAnalyzer;

#[derive(Default)]
pub struct AnalyzerSlot {
    analyzer: Mutex<Option<Arc<SpectrumAnalyzer>>>,
}

impl AnalyzerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an analyzer, replacing any previous one
    pub fn attach(&self, analyzer: Arc<SpectrumAnalyzer>) {
        let previous = self.analyzer.lock().replace(analyzer);
        if previous.is_some() {
            nih_log!("Replaced attached spectrum analyzer");
        }
    }

    /// Detach the current analyzer. The returned handle is dropped by the
    /// caller, outside the lock and off the audio thread.
    pub fn detach(&self) -> Option<Arc<SpectrumAnalyzer>> {
        self.analyzer.lock().take()
    }

    /// Attach and get a guard that detaches again when dropped
    pub fn register(self: &Arc<Self>, analyzer: Arc<SpectrumAnalyzer>) -> AnalyzerRegistration {
        self.attach(analyzer.clone());
        nih_log!("Spectrum analyzer attached ({} sample frames)", analyzer.frame_size());
        AnalyzerRegistration {
            slot: self.clone(),
            analyzer,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.analyzer.lock().is_some()
    }

    /// Run `f` against the attached analyzer, if any.
    ///
    /// Safe on the audio thread: returns `None` without waiting when the
    /// slot is contended.
    pub fn with_attached<R>(&self, f: impl FnOnce(&SpectrumAnalyzer) -> R) -> Option<R> {
        let guard = self.analyzer.try_lock()?;
        guard.as_deref().map(f)
    }

    /// Blocking variant of `with_attached` for non-realtime callers
    pub fn with_attached_blocking<R>(&self, f: impl FnOnce(&SpectrumAnalyzer) -> R) -> Option<R> {
        self.analyzer.lock().as_deref().map(f)
    }
}

/// Keeps an analyzer attached for as long as it lives
pub struct AnalyzerRegistration {
    slot: Arc<AnalyzerSlot>,
    analyzer: Arc<SpectrumAnalyzer>,
}

impl AnalyzerRegistration {
    pub fn analyzer(&self) -> &Arc<SpectrumAnalyzer> {
        &self.analyzer
    }
}

impl Drop for AnalyzerRegistration {
    fn drop(&mut self) {
        let detached = {
            let mut attached = self.slot.analyzer.lock();
            // Someone else may have attached in the meantime; leave theirs alone
            if attached
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &self.analyzer))
            {
                attached.take()
            } else {
                None
            }
        };

        if detached.is_some() {
            nih_log!("Spectrum analyzer detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Arc<SpectrumAnalyzer> {
        Arc::new(SpectrumAnalyzer::new(64).unwrap())
    }

    #[test]
    fn test_detached_slot_skips() {
        let slot = AnalyzerSlot::new();
        assert!(!slot.is_attached());
        assert_eq!(slot.with_attached(|a| a.frame_size()), None);
    }

    #[test]
    fn test_attach_and_detach() {
        let slot = AnalyzerSlot::new();
        let analyzer = analyzer();
        slot.attach(analyzer.clone());

        slot.with_attached(|a| a.push_buffer(&[1.0; 64]));
        assert_eq!(analyzer.frames_processed(), 1);

        let detached = slot.detach().unwrap();
        assert!(Arc::ptr_eq(&detached, &analyzer));
        assert!(!slot.is_attached());
    }

    #[test]
    fn test_registration_detaches_on_drop() {
        let slot = Arc::new(AnalyzerSlot::new());
        let registration = slot.register(analyzer());
        assert!(slot.is_attached());
        assert_eq!(Arc::strong_count(registration.analyzer()), 2);

        drop(registration);
        assert!(!slot.is_attached());
    }

    #[test]
    fn test_stale_registration_leaves_newer_analyzer() {
        let slot = Arc::new(AnalyzerSlot::new());
        let old = slot.register(analyzer());
        let newer = analyzer();
        slot.attach(newer.clone());

        drop(old);
        assert!(slot.with_attached_blocking(|a| std::ptr::eq(a, newer.as_ref())).unwrap());
    }

    #[test]
    fn test_contended_slot_is_skipped() {
        let slot = AnalyzerSlot::new();
        slot.attach(analyzer());

        let _held = slot.analyzer.lock();
        assert_eq!(slot.with_attached(|_| ()), None);
    }
}
