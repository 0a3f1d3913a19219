//! One audio callback: filter bank in place, then a mono mix for the analyzer

use std::sync::Arc;

use crate::analysis::SpectrumAnalyzer;
use crate::dsp::filter_bank::FilterBank;
use crate::dsp::BandSource;

use super::{EqShared, FALLBACK_BLOCK_SIZE};

pub struct EqProcessor {
    filter_bank: FilterBank,
    shared: Arc<EqShared>,
    /// Mono analysis scratch, sized in `prepare`
    mono: Vec<f32>,
    /// A reset could not clear the analyzer without waiting; retried before the next push
    clear_pending: bool,
}

impl EqProcessor {
    pub fn new(shared: Arc<EqShared>) -> Self {
        Self {
            filter_bank: FilterBank::new(shared.cache().clone()),
            shared,
            mono: Vec::new(),
            clear_pending: false,
        }
    }

    pub fn shared(&self) -> &Arc<EqShared> {
        &self.shared
    }

    /// Allocate everything the audio thread needs. Must precede `process`.
    ///
    /// Runs off the audio thread, so it may wait for the editor.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize, num_channels: usize) {
        self.filter_bank.prepare(sample_rate, num_channels);

        let scratch_len = if max_block_size > 0 {
            max_block_size
        } else {
            FALLBACK_BLOCK_SIZE
        };
        self.mono.clear();
        self.mono.resize(scratch_len, 0.0);

        self.shared
            .analyzer_slot()
            .with_attached_blocking(SpectrumAnalyzer::clear);
        self.clear_pending = false;
    }

    /// Zero filter memory and drop any partially accumulated analysis frame.
    ///
    /// Called on the audio thread: if the editor holds the analyzer right
    /// now, the clear is deferred to the next `process` instead of waiting.
    pub fn reset(&mut self) {
        self.filter_bank.reset();
        let cleared = self
            .shared
            .analyzer_slot()
            .with_attached(SpectrumAnalyzer::try_clear);
        self.clear_pending = cleared != Some(true);
    }

    /// Process planar channels in place
    pub fn process<S>(&mut self, channels: &mut [&mut [f32]], source: &S)
    where
        S: BandSource + ?Sized,
    {
        self.filter_bank.process(channels, source);

        let mono = &mut self.mono;
        let clear_pending = &mut self.clear_pending;
        let channels: &[&mut [f32]] = channels;
        self.shared.analyzer_slot().with_attached(|analyzer| {
            if !finish_pending_clear(analyzer, clear_pending) {
                return;
            }

            let num_samples = channels.iter().map(|channel| channel.len()).min().unwrap_or(0);
            push_mono(analyzer, mono, num_samples, channels.len(), |frame, ch| {
                channels[ch][frame]
            });
        });
    }

    /// Process an interleaved buffer in place
    pub fn process_interleaved<S>(&mut self, samples: &mut [f32], num_channels: usize, source: &S)
    where
        S: BandSource + ?Sized,
    {
        self.filter_bank
            .process_interleaved(samples, num_channels, source);

        if num_channels == 0 {
            return;
        }

        let mono = &mut self.mono;
        let clear_pending = &mut self.clear_pending;
        let samples: &[f32] = samples;
        self.shared.analyzer_slot().with_attached(|analyzer| {
            if !finish_pending_clear(analyzer, clear_pending) {
                return;
            }

            push_mono(
                analyzer,
                mono,
                samples.len() / num_channels,
                num_channels,
                |frame, ch| samples[frame * num_channels + ch],
            );
        });
    }
}

/// Retry a deferred clear. False while it still cannot run; the block is not pushed then.
fn finish_pending_clear(analyzer: &SpectrumAnalyzer, clear_pending: &mut bool) -> bool {
    if *clear_pending {
        *clear_pending = !analyzer.try_clear();
    }
    !*clear_pending
}

/// Mix down to mono with a `1 / sqrt(channels)` gain and feed the analyzer,
/// one scratch-sized chunk at a time
fn push_mono(
    analyzer: &SpectrumAnalyzer,
    scratch: &mut [f32],
    num_samples: usize,
    num_channels: usize,
    sample: impl Fn(usize, usize) -> f32,
) {
    if num_channels == 0 || scratch.is_empty() {
        return;
    }

    let gain = 1.0 / (num_channels as f32).sqrt();
    let mut start = 0;
    while start < num_samples {
        let len = scratch.len().min(num_samples - start);
        let chunk = &mut scratch[..len];

        for (offset, mono) in chunk.iter_mut().enumerate() {
            let frame = start + offset;
            let sum: f32 = (0..num_channels).map(|ch| sample(frame, ch)).sum();
            *mono = sum * gain;
        }

        analyzer.push_buffer(chunk);
        start += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{BandSnapshot, FilterType, NUM_BANDS};
    use std::sync::mpsc;
    use std::thread;

    const SR: f64 = 48000.0;
    const FRAME: usize = 256;

    fn flat_bands() -> [BandSnapshot; NUM_BANDS] {
        [BandSnapshot::peak(1000.0, 1.0, 0.0); NUM_BANDS]
    }

    fn processor(max_block: usize, channels: usize) -> EqProcessor {
        let shared = Arc::new(EqShared::new(NUM_BANDS, SR));
        let mut processor = EqProcessor::new(shared);
        processor.prepare(SR, max_block, channels);
        processor
    }

    fn analyzer() -> Arc<SpectrumAnalyzer> {
        Arc::new(SpectrumAnalyzer::new(FRAME).unwrap())
    }

    #[test]
    fn test_detached_analyzer_processes_normally() {
        let mut processor = processor(512, 2);
        let bands = flat_bands();

        let mut left = vec![0.5; 512];
        let mut right = vec![-0.5; 512];
        processor.process(&mut [left.as_mut_slice(), right.as_mut_slice()], &bands);

        assert!(left.iter().all(|&s| s == 0.5));
        assert!(right.iter().all(|&s| s == -0.5));
        assert!(processor.shared().spectrum_frame().is_none());
    }

    #[test]
    fn test_stereo_dc_reaches_analyzer() {
        let mut processor = processor(FRAME, 2);
        let analyzer = analyzer();
        let _registration = processor.shared().register_analyzer(analyzer.clone());
        let bands = flat_bands();

        let mut left = vec![0.25; FRAME];
        let mut right = vec![0.25; FRAME];
        processor.process(&mut [left.as_mut_slice(), right.as_mut_slice()], &bands);

        assert_eq!(analyzer.frames_processed(), 1);
        assert!(analyzer.take_frame_ready());

        // 0.5 summed, scaled by 1/sqrt(2)
        let expected = 0.5 / 2.0f32.sqrt();
        let magnitudes = analyzer.magnitudes();
        assert!((magnitudes[0] - expected).abs() < 1e-3, "bin 0 {}", magnitudes[0]);

        let frame = processor.shared().spectrum_frame().unwrap();
        assert_eq!(frame.len(), FRAME / 2);
        assert!((frame[0] - 20.0 * expected.log10()).abs() < 0.05);
    }

    #[test]
    fn test_blocks_larger_than_scratch_are_chunked() {
        let mut processor = processor(64, 1);
        let analyzer = analyzer();
        processor.shared().attach_analyzer(analyzer.clone());

        let mut block = vec![0.1; FRAME * 2];
        processor.process(&mut [block.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.frames_processed(), 2);

        let mut partial = vec![0.1; FRAME - 1];
        processor.process(&mut [partial.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.frames_processed(), 2);
        assert_eq!(analyzer.fifo_write_index(), FRAME - 1);
    }

    #[test]
    fn test_detached_analyzer_receives_nothing_more() {
        let mut processor = processor(FRAME, 1);
        let analyzer = analyzer();
        processor.shared().attach_analyzer(analyzer.clone());

        let mut block = vec![0.1; FRAME];
        processor.process(&mut [block.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.frames_processed(), 1);

        let detached = processor.shared().detach_analyzer().unwrap();
        assert!(Arc::ptr_eq(&detached, &analyzer));
        assert!(processor.shared().detach_analyzer().is_none());

        let mut block = vec![0.1; FRAME + 10];
        processor.process(&mut [block.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.frames_processed(), 1);
        assert_eq!(analyzer.fifo_write_index(), 0);
        assert!(processor.shared().spectrum_frame().is_none());
    }

    #[test]
    fn test_unequal_channel_lengths_use_shortest() {
        let mut processor = processor(512, 2);
        let analyzer = analyzer();
        processor.shared().attach_analyzer(analyzer.clone());

        let mut left = vec![0.1; 300];
        let mut right = vec![0.1; 200];
        processor.process(&mut [left.as_mut_slice(), right.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.fifo_write_index(), 200);
    }

    #[test]
    fn test_reset_does_not_wait_for_editor() {
        let mut processor = processor(FRAME, 1);
        let analyzer = analyzer();
        processor.shared().attach_analyzer(analyzer.clone());

        let mut block = vec![0.1; 100];
        processor.process(&mut [block.as_mut_slice()], &flat_bands());

        // Editor side sits inside the slot lock until told to let go
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let slot = processor.shared().analyzer_slot().clone();
        let editor = thread::spawn(move || {
            slot.with_attached_blocking(|_| {
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
        });
        held_rx.recv().unwrap();

        processor.reset();
        assert_eq!(analyzer.fifo_write_index(), 100);

        release_tx.send(()).unwrap();
        editor.join().unwrap();

        // The deferred clear runs before the next push
        let mut block = vec![0.1; 10];
        processor.process(&mut [block.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.fifo_write_index(), 10);
    }

    #[test]
    fn test_reset_clears_partial_frame() {
        let mut processor = processor(FRAME, 1);
        let analyzer = analyzer();
        processor.shared().attach_analyzer(analyzer.clone());

        let mut block = vec![0.1; 100];
        processor.process(&mut [block.as_mut_slice()], &flat_bands());
        assert_eq!(analyzer.fifo_write_index(), 100);

        processor.reset();
        assert_eq!(analyzer.fifo_write_index(), 0);
    }

    #[test]
    fn test_interleaved_feeds_same_mono_mix() {
        let mut processor = processor(FRAME, 2);
        let analyzer = analyzer();
        processor.shared().attach_analyzer(analyzer.clone());

        let mut frames: Vec<f32> = (0..FRAME).flat_map(|_| [0.25, 0.25]).collect();
        processor.process_interleaved(&mut frames, 2, &flat_bands());

        assert_eq!(analyzer.frames_processed(), 1);
        let expected = 0.5 / 2.0f32.sqrt();
        assert!((analyzer.magnitudes()[0] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_parameter_change_needs_dirty_flag() {
        let mut processor = processor(256, 1);
        let mut bands = flat_bands();
        bands[0] = BandSnapshot::peak(1000.0, 1.0, 6.0);

        let mut block = vec![0.0; 256];
        processor.process(&mut [block.as_mut_slice()], &bands);
        let first = processor.shared().cache().published(0).unwrap();

        // Not flagged: the audio path keeps the old coefficients
        bands[0].gain_db = 12.0;
        processor.process(&mut [block.as_mut_slice()], &bands);
        assert_eq!(processor.shared().cache().published(0), Some(first));

        processor.shared().mark_dirty(0);
        processor.process(&mut [block.as_mut_slice()], &bands);
        assert_ne!(processor.shared().cache().published(0), Some(first));
    }

    #[test]
    fn test_eq_curve_scenarios() {
        let shared = EqShared::new(2, SR);
        let bands = [
            BandSnapshot::new(FilterType::LowPass, 500.0, 0.707, 0.0),
            BandSnapshot::new(FilterType::HighPass, 200.0, 0.707, 0.0),
        ];

        let curve = shared.eq_curve(512, &bands);
        assert_eq!(curve.len(), 512);
        // First and last points sit at 20 Hz and 20 kHz, both deep in the stopbands
        assert!(curve[0] < -12.0);
        assert!(curve[511] < -12.0);

        let peak = EqShared::new(1, SR);
        let curve = peak.eq_curve(2, &[BandSnapshot::peak(1000.0, 1.0, 6.0)]);
        assert!(curve[0].abs() < 0.1);
        assert!(curve[1].abs() < 0.1);
    }
}
