//! Spectrum Analysis
//!
//! Frame accumulation, windowed FFT and the attach point the audio thread
//! feeds. The editor owns the analyzer; the processor only borrows it
//! through the slot.

mod frame_bridge;
mod slot;
mod spectrum;

pub use frame_bridge::FrameBridge;
pub use slot::{AnalyzerRegistration, AnalyzerSlot};
pub use spectrum::{SpectrumAnalyzer, DEFAULT_FRAME_SIZE, MIN_FRAME_SIZE};
