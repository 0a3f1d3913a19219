use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 48000;

/// Log sweep range, the same span the equalizer displays
const SWEEP_START_HZ: f32 = 20.0;
const SWEEP_END_HZ: f32 = 20000.0;
const SWEEP_SECS: f32 = 10.0;

/// DC-offset pulse train: 0.25 offset, 100 ms on, 100 ms off
const PULSE_OFFSET: f32 = 0.25;
const PULSE_PERIOD_SECS: f32 = 0.2;
const PULSE_SECS: f32 = 4.0;

fn main() -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    write_wav("sweep_20_20k.wav", spec, &log_sweep())?;
    write_wav("dc_pulses.wav", spec, &dc_pulse_train())?;

    Ok(())
}

/// Exponential sine sweep at -6 dBFS. Phase is the integral of the
/// instantaneous frequency so there are no discontinuities.
fn log_sweep() -> Vec<f32> {
    let total = (SAMPLE_RATE as f32 * SWEEP_SECS) as usize;
    let ratio = (SWEEP_END_HZ / SWEEP_START_HZ).ln();
    let k = SWEEP_SECS / ratio;

    let mut output: Vec<f32> = (0..total)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let phase = 2.0 * PI * SWEEP_START_HZ * k * ((t / k).exp() - 1.0);
            0.5 * phase.sin()
        })
        .collect();

    apply_fades(&mut output, (SAMPLE_RATE / 100) as usize);
    output
}

fn dc_pulse_train() -> Vec<f32> {
    let total = (SAMPLE_RATE as f32 * PULSE_SECS) as usize;
    let period = (SAMPLE_RATE as f32 * PULSE_PERIOD_SECS) as usize;

    (0..total)
        .map(|i| if i % period < period / 2 { PULSE_OFFSET } else { 0.0 })
        .collect()
}

/// Linear fade in/out to avoid clicks at the edges
fn apply_fades(samples: &mut [f32], fade_len: usize) {
    let fade_len = fade_len.min(samples.len() / 2);
    let len = samples.len();

    for i in 0..fade_len {
        let gain = i as f32 / fade_len as f32;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

/// Write the same signal to both channels
fn write_wav(path: &str, spec: WavSpec, samples: &[f32]) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        for _ in 0..spec.channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;

    println!(
        "Wrote {} ({:.1}s, {} Hz)",
        path,
        samples.len() as f32 / SAMPLE_RATE as f32,
        SAMPLE_RATE
    );
    Ok(())
}
