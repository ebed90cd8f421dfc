//! Audio Test File Generation Utilities
//!
//! Deterministic fixtures with known sample values:
//! - Silent audio (all zeros)
//! - Constant (DC) audio, so gains can be read straight off the output
//! - Sine waves at specific frequencies
//! - Constant steps, so crop offsets can be read straight off the output
//!
//! WAV files go through hound; raw voice recordings are headerless s16le.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Standard test sample rate (8 kHz keeps fixtures small)
pub const TEST_SAMPLE_RATE: u32 = 8_000;

fn frames_for(duration_ms: u64) -> u64 {
    TEST_SAMPLE_RATE as u64 * duration_ms / 1000
}

fn write_wav<P, F>(path: P, duration_ms: u64, channels: u16, mut sample_at: F) -> Result<(), hound::Error>
where
    P: AsRef<Path>,
    F: FnMut(u64) -> i16,
{
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..frames_for(duration_ms) {
        let sample = sample_at(frame);
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Generate a silent WAV file
pub fn generate_silent_wav<P: AsRef<Path>>(path: P, duration_ms: u64, channels: u16) -> Result<(), hound::Error> {
    write_wav(path, duration_ms, channels, |_| 0)
}

/// Generate a WAV file where every sample equals `value`
///
/// # Example
/// ```no_run
/// # use std::path::Path;
/// // 20 s stereo bed at 10000 (about -10 dBFS)
/// generate_constant_wav(Path::new("/tmp/bed.wav"), 20_000, 2, 10_000)?;
/// # Ok::<(), hound::Error>(())
/// ```
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    channels: u16,
    value: i16,
) -> Result<(), hound::Error> {
    write_wav(path, duration_ms, channels, |_| value)
}

/// Generate a sine WAV file, same signal on every channel
///
/// # Arguments
/// * `amplitude` - 0.0-1.0 of full scale
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    channels: u16,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    write_wav(path, duration_ms, channels, |frame| sine_sample(frame, frequency_hz, amplitude))
}

/// Generate a WAV file made of constant steps, each `(duration_ms, value)`
pub fn generate_steps_wav<P: AsRef<Path>>(
    path: P,
    steps: &[(u64, i16)],
    channels: u16,
) -> Result<(), hound::Error> {
    let bounds: Vec<(u64, i16)> = steps
        .iter()
        .scan(0u64, |end, &(ms, value)| {
            *end += frames_for(ms);
            Some((*end, value))
        })
        .collect();
    let total_ms = steps.iter().map(|&(ms, _)| ms).sum();
    write_wav(path, total_ms, channels, |frame| {
        bounds
            .iter()
            .find(|&&(end, _)| frame < end)
            .map_or(0, |&(_, value)| value)
    })
}

/// Sample value the sine generators write at `frame`
pub fn sine_sample(frame: u64, frequency_hz: f32, amplitude: f32) -> i16 {
    let t = frame as f32 / TEST_SAMPLE_RATE as f32;
    ((2.0 * PI * frequency_hz * t).sin() * amplitude * i16::MAX as f32) as i16
}

/// Write interleaved samples as headerless s16le
pub fn write_raw_pcm<P: AsRef<Path>>(path: P, samples: &[i16]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for sample in samples {
        writer.write_all(&sample.to_le_bytes())?;
    }
    writer.flush()
}

/// Silent raw voice recording
pub fn generate_silent_pcm<P: AsRef<Path>>(path: P, duration_ms: u64, channels: u16) -> std::io::Result<()> {
    let samples = vec![0i16; (frames_for(duration_ms) * channels as u64) as usize];
    write_raw_pcm(path, &samples)
}

/// Raw voice recording carrying a sine on every channel
pub fn generate_sine_pcm<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    channels: u16,
    frequency_hz: f32,
    amplitude: f32,
) -> std::io::Result<()> {
    let samples: Vec<i16> = (0..frames_for(duration_ms))
        .flat_map(|frame| {
            let s = sine_sample(frame, frequency_hz, amplitude);
            std::iter::repeat(s).take(channels as usize)
        })
        .collect();
    write_raw_pcm(path, &samples)
}
