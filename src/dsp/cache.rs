//! Per-band coefficient cache shared by the audio thread and the editor.
//!
//! Each band slot holds a dirty flag and the last published coefficient set.
//! Whichever consumer observes the dirty flag first recomputes and publishes;
//! the other one picks up the published set. Publishing goes through a small
//! sequence lock so readers never wait and never act on a torn set.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};

use super::coefficients::CoefficientSet;
use super::BandSource;

struct CoefficientSlot {
    dirty: AtomicBool,
    /// Even while stable, odd while a writer is mid-publish
    seq: AtomicU32,
    words: [AtomicU64; 5],
}

impl CoefficientSlot {
    fn new() -> Self {
        let words = CoefficientSet::UNITY.to_words();
        Self {
            dirty: AtomicBool::new(true),
            seq: AtomicU32::new(0),
            words: words.map(AtomicU64::new),
        }
    }

    /// Publish a set and return its sequence number, or `None` if another
    /// writer holds the slot.
    fn publish(&self, coeffs: &CoefficientSet) -> Option<u32> {
        let seq = self.seq.load(Ordering::Relaxed);
        if seq & 1 == 1
            || self
                .seq
                .compare_exchange(seq, seq.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            return None;
        }
        fence(Ordering::Release);

        for (slot, word) in self.words.iter().zip(coeffs.to_words()) {
            slot.store(word, Ordering::Relaxed);
        }

        let published = seq.wrapping_add(2);
        self.seq.store(published, Ordering::Release);
        Some(published)
    }

    /// Sequence number of the current set, `None` while a publish is in flight
    fn version(&self) -> Option<u32> {
        let seq = self.seq.load(Ordering::Acquire);
        (seq & 1 == 0).then_some(seq)
    }

    /// Single read attempt; `None` if a publish was in flight
    fn load(&self) -> Option<(CoefficientSet, u32)> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }

        let words = [
            self.words[0].load(Ordering::Relaxed),
            self.words[1].load(Ordering::Relaxed),
            self.words[2].load(Ordering::Relaxed),
            self.words[3].load(Ordering::Relaxed),
            self.words[4].load(Ordering::Relaxed),
        ];

        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then(|| (CoefficientSet::from_words(words), before))
    }
}

/// Lazily recomputed coefficients for every band
pub struct CoefficientCache {
    slots: Box<[CoefficientSlot]>,
    sample_rate: AtomicU64,
    /// Bumped on every parameter change; the response curve rebuilds when it moves
    revision: AtomicU64,
}

impl CoefficientCache {
    pub fn new(num_bands: usize, sample_rate: f64) -> Self {
        Self {
            slots: (0..num_bands).map(|_| CoefficientSlot::new()).collect(),
            sample_rate: AtomicU64::new(sample_rate.to_bits()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn num_bands(&self) -> usize {
        self.slots.len()
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    /// Change the design sample rate; every band becomes dirty
    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Release);
        self.mark_all_dirty();
    }

    /// Flag a band as stale. Idempotent and safe from any thread.
    pub fn mark_dirty(&self, band: usize) {
        if let Some(slot) = self.slots.get(band) {
            slot.dirty.store(true, Ordering::Release);
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn mark_all_dirty(&self) {
        for slot in self.slots.iter() {
            slot.dirty.store(true, Ordering::Release);
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_dirty(&self, band: usize) -> bool {
        self.slots
            .get(band)
            .is_some_and(|slot| slot.dirty.load(Ordering::Acquire))
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Current coefficients for `band`, recomputing them if the band is dirty.
    ///
    /// Never blocks. `fallback` is returned when the published set is being
    /// rewritten by the other consumer at this very moment; callers pass the
    /// set they used last time.
    pub fn get_or_recompute<S>(&self, band: usize, source: &S, fallback: CoefficientSet) -> CoefficientSet
    where
        S: BandSource + ?Sized,
    {
        self.get_or_recompute_versioned(band, source, fallback).0
    }

    /// Like `get_or_recompute`, also returning the version of the published
    /// set that was used. `None` means the result is not the published set
    /// (fallback, or a recompute that lost the publish race), so a caller
    /// caching derived data should treat it as stale.
    pub fn get_or_recompute_versioned<S>(
        &self,
        band: usize,
        source: &S,
        fallback: CoefficientSet,
    ) -> (CoefficientSet, Option<u32>)
    where
        S: BandSource + ?Sized,
    {
        let Some(slot) = self.slots.get(band) else {
            return (fallback, None);
        };

        if slot.dirty.swap(false, Ordering::AcqRel) {
            let fresh = CoefficientSet::design(self.sample_rate(), &source.band(band));
            let version = slot.publish(&fresh);
            if version.is_none() {
                // Lost the race to a concurrent publish, try again next time
                slot.dirty.store(true, Ordering::Release);
            }
            return (fresh, version);
        }

        match slot.load() {
            Some((coeffs, version)) => (coeffs, Some(version)),
            None => (fallback, None),
        }
    }

    /// Version of the band's published set. Moves on every publish, so
    /// comparing it against a remembered value detects sets published by
    /// another consumer after the dirty flag was already cleared.
    pub fn version(&self, band: usize) -> Option<u32> {
        self.slots.get(band).and_then(CoefficientSlot::version)
    }

    /// Last published coefficients without triggering a recompute
    pub fn published(&self, band: usize) -> Option<CoefficientSet> {
        self.slots.get(band).and_then(CoefficientSlot::load).map(|(coeffs, _)| coeffs)
    }
}
