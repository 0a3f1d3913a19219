//! Spectrum Analyzer
//!
//! Collects the mono-summed output of the filter bank into fixed-size frames
//! and turns each completed frame into a magnitude spectrum: normalised Hann
//! window, real FFT, magnitudes scaled by 1/frame_size.
//!
//! The audio thread pushes samples and runs the transform when a frame
//! completes. The FIFO lock is held only while samples are written and while
//! a finished frame is copied out; the transform itself runs outside it. The
//! editor reads the result under the transform lock so it never sees a
//! half-written spectrum.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use realfft::{num_complex::Complex32, FftError, RealFftPlanner, RealToComplex};

use super::frame_bridge::FrameBridge;
use crate::dsp::coefficients::gain_to_db;
use crate::dsp::{MAX_FREQUENCY, MIN_FREQUENCY};
use crate::error::{ConfigError, Result};

/// Frame size used by the editor (2^12)
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Smallest frame size accepted
pub const MIN_FRAME_SIZE: usize = 64;

/// Working buffers for one transform
struct Transform {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    /// Time-domain frame, windowed in place
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    /// Linear magnitude per bin, frame_size / 2 entries
    magnitudes: Vec<f32>,
}

impl Transform {
    fn new(frame_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);

        Self {
            window: hann_window(frame_size),
            frame: fft.make_input_vec(),
            spectrum: fft.make_output_vec(),
            scratch: fft.make_scratch_vec(),
            magnitudes: vec![0.0; frame_size / 2],
            fft,
        }
    }

    fn run(&mut self) -> std::result::Result<(), FftError> {
        for (sample, w) in self.frame.iter_mut().zip(&self.window) {
            *sample *= w;
        }

        self.fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch)?;

        let scale = 1.0 / self.frame.len() as f32;
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(&self.spectrum) {
            *magnitude = bin.norm() * scale;
        }

        Ok(())
    }

    fn clear(&mut self) {
        self.frame.fill(0.0);
        self.magnitudes.fill(0.0);
    }
}

/// Hann window scaled so its coefficients sum to `size`
fn hann_window(size: usize) -> Vec<f32> {
    let denominator = (size.max(2) - 1) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denominator).cos())
        .collect();

    let sum: f64 = raw.iter().sum();
    let factor = if sum > 0.0 { size as f64 / sum } else { 1.0 };
    raw.into_iter().map(|w| (w * factor) as f32).collect()
}

pub struct SpectrumAnalyzer {
    frame_size: usize,
    fifo: Mutex<FrameBridge>,
    transform: Mutex<Transform>,
    frame_ready: AtomicBool,
    frames_processed: AtomicU64,
    /// Frames dropped because a reader held the transform buffers
    frames_skipped: AtomicU32,
    transform_failures: AtomicU32,
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize) -> Result<Self> {
        if frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::FrameSizeTooSmall(frame_size, MIN_FRAME_SIZE));
        }
        if !frame_size.is_power_of_two() {
            return Err(ConfigError::FrameSizeNotPowerOfTwo(frame_size));
        }

        Ok(Self {
            frame_size,
            fifo: Mutex::new(FrameBridge::new(frame_size)),
            transform: Mutex::new(Transform::new(frame_size)),
            frame_ready: AtomicBool::new(false),
            frames_processed: AtomicU64::new(0),
            frames_skipped: AtomicU32::new(0),
            transform_failures: AtomicU32::new(0),
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of bins exposed to readers
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2
    }

    /// Append mono samples, transforming every frame that completes.
    ///
    /// Called from the audio thread. Never allocates. If the editor is
    /// reading the previous spectrum at the moment a frame completes, that
    /// frame is dropped rather than waited for.
    pub fn push_buffer(&self, samples: &[f32]) {
        let mut remaining = samples;

        while !remaining.is_empty() {
            let completed = {
                let mut fifo = self.fifo.lock();
                let written = fifo.push(remaining);
                remaining = &remaining[written..];

                if fifo.has_frame() {
                    match self.transform.try_lock() {
                        Some(mut transform) => {
                            fifo.pop_frame(&mut transform.frame);
                            Some(transform)
                        }
                        None => {
                            fifo.discard_frame();
                            self.frames_skipped.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    }
                } else {
                    None
                }
            };

            if let Some(mut transform) = completed {
                match transform.run() {
                    Ok(()) => {
                        self.frames_processed.fetch_add(1, Ordering::Relaxed);
                        self.frame_ready.store(true, Ordering::Release);
                    }
                    Err(_) => {
                        self.transform_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Returns true once per completed frame
    pub fn take_frame_ready(&self) -> bool {
        self.frame_ready.swap(false, Ordering::AcqRel)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u32 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    pub fn transform_failures(&self) -> u32 {
        self.transform_failures.load(Ordering::Relaxed)
    }

    /// Samples written towards the next frame
    pub fn fifo_write_index(&self) -> usize {
        self.fifo.lock().write_index()
    }

    /// Latest spectrum in dB, `num_bins()` entries, floored at -100 dB
    pub fn spectrum_frame(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.num_bins()];
        self.copy_spectrum_db(&mut out);
        out
    }

    /// Copy the latest spectrum in dB into `out` without allocating
    pub fn copy_spectrum_db(&self, out: &mut [f32]) {
        let transform = self.transform.lock();
        for (db, &magnitude) in out.iter_mut().zip(&transform.magnitudes) {
            *db = gain_to_db(magnitude);
        }
    }

    /// Latest spectrum as linear magnitudes
    pub fn magnitudes(&self) -> Vec<f32> {
        self.transform.lock().magnitudes.clone()
    }

    /// Centre frequency of `bin`
    pub fn bin_frequency(&self, bin: usize, sample_rate: f32) -> f32 {
        bin as f32 * sample_rate / self.frame_size as f32
    }

    /// Bins whose frequency lies within 20 Hz..20 kHz
    pub fn visible_bins(&self, sample_rate: f32) -> Range<usize> {
        let bins = 0..self.num_bins();
        let start = bins
            .clone()
            .find(|&bin| self.bin_frequency(bin, sample_rate) >= MIN_FREQUENCY)
            .unwrap_or(self.num_bins());
        let end = bins
            .rev()
            .find(|&bin| self.bin_frequency(bin, sample_rate) <= MAX_FREQUENCY)
            .map_or(start, |bin| (bin + 1).max(start));
        start..end
    }

    /// Drop buffered samples and the last spectrum. Blocks; not for the audio thread.
    pub fn clear(&self) {
        self.fifo.lock().clear();
        self.transform.lock().clear();
        self.frame_ready.store(false, Ordering::Release);
    }

    /// Non-blocking `clear`. Returns false and changes nothing if either
    /// buffer is held by someone else.
    pub fn try_clear(&self) -> bool {
        let Some(mut fifo) = self.fifo.try_lock() else {
            return false;
        };
        let Some(mut transform) = self.transform.try_lock() else {
            return false;
        };

        fifo.clear();
        transform.clear();
        self.frame_ready.store(false, Ordering::Release);
        true
    }
}
