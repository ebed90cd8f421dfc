//! Whole-file PCM utilities
//!
//! Length, crop and concatenation for headerless s16le files and 16-bit WAV
//! files. Crop bounds are clamped to the file and aligned to whole frames;
//! an open end runs to the end of the file.

use crate::audio::{FrameSource, PcmFileReader, PcmSink, RawPcmSink};
use crate::error::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};
use voxmix_common::timing::{frames_to_ms, ms_to_frames};

const COPY_BLOCK_FRAMES: usize = 4096;

/// True when `path` has a `.wav` extension (any case).
pub fn is_wav_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

fn check_layout(sample_rate: u32, channels: u16) -> Result<()> {
    if sample_rate == 0 || channels == 0 {
        return Err(Error::InvalidArgument(format!(
            "raw PCM layout {} Hz × {} channels",
            sample_rate, channels
        )));
    }
    Ok(())
}

/// Frame range `[start, end)` for a crop request, clamped to `total` frames.
fn crop_range(start_ms: u64, end_ms: Option<u64>, sample_rate: u32, total: u64) -> Result<(u64, u64)> {
    if let Some(end_ms) = end_ms {
        if end_ms < start_ms {
            return Err(Error::InvalidArgument(format!(
                "crop end {} ms is before start {} ms",
                end_ms, start_ms
            )));
        }
    }
    let start = ms_to_frames(start_ms, sample_rate).min(total);
    let end = end_ms.map_or(total, |ms| ms_to_frames(ms, sample_rate).min(total));
    Ok((start, end))
}

/// Playing time of a raw s16le file in whole milliseconds.
pub fn pcm_duration_ms(path: &Path, sample_rate: u32, channels: u16) -> Result<u64> {
    check_layout(sample_rate, channels)?;
    let reader = PcmFileReader::open(path, sample_rate, channels, channels)?;
    Ok(frames_to_ms(reader.duration_frames().unwrap_or(0), reader.sample_rate()))
}

/// Copy `[start_ms, end_ms)` of a raw s16le file into `output`.
///
/// Returns the number of frames written.
pub fn crop_pcm(
    input: &Path,
    output: &Path,
    sample_rate: u32,
    channels: u16,
    start_ms: u64,
    end_ms: Option<u64>,
) -> Result<u64> {
    check_layout(sample_rate, channels)?;
    let mut reader = PcmFileReader::open(input, sample_rate, channels, channels)?;
    let total = reader.duration_frames().unwrap_or(0);
    let (start, end) = crop_range(start_ms, end_ms, sample_rate, total)?;
    reader.seek_to_frame(start)?;

    let mut sink = RawPcmSink::create(output)?;
    let channels = channels as usize;
    let mut buffer = vec![0i16; COPY_BLOCK_FRAMES * channels];
    let mut remaining = end - start;
    while remaining > 0 {
        let want = remaining.min(COPY_BLOCK_FRAMES as u64) as usize;
        let n = reader.read(&mut buffer, want, false)?;
        if n == 0 {
            break;
        }
        sink.write(&buffer[..n * channels])?;
        remaining -= n as u64;
    }
    sink.finish()?;

    let written = end - start - remaining;
    info!(
        "Cropped {} [{}, {}) frames into {}",
        input.display(),
        start,
        end,
        output.display()
    );
    Ok(written)
}

/// Append raw PCM files byte for byte into `output`.
///
/// Every input must share one layout; nothing is checked or converted.
/// Returns the number of bytes written.
pub fn concat_pcm<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<u64> {
    if inputs.is_empty() {
        return Err(Error::InvalidArgument("nothing to concatenate".into()));
    }
    let mut writer = BufWriter::new(File::create(output)?);
    let mut total = 0u64;
    for input in inputs {
        let mut file = File::open(input.as_ref())?;
        let copied = std::io::copy(&mut file, &mut writer)?;
        debug!("Appended {} bytes from {}", copied, input.as_ref().display());
        total += copied;
    }
    writer.flush()?;
    info!("Concatenated {} files into {}", inputs.len(), output.display());
    Ok(total)
}

/// Playing time of a WAV file in whole milliseconds.
pub fn wav_duration_ms(path: &Path) -> Result<u64> {
    let reader = WavReader::open(path)?;
    Ok(frames_to_ms(reader.duration() as u64, reader.spec().sample_rate))
}

/// Copy `[start_ms, end_ms)` of a 16-bit integer WAV file into a new WAV
/// with the same format.
///
/// Returns the number of frames written.
pub fn crop_wav(input: &Path, output: &Path, start_ms: u64, end_ms: Option<u64>) -> Result<u64> {
    let mut reader = WavReader::open(input)?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
        return Err(Error::InvalidArgument(format!(
            "{} is not 16-bit integer PCM",
            input.display()
        )));
    }
    let (start, end) = crop_range(start_ms, end_ms, spec.sample_rate, reader.duration() as u64)?;
    reader.seek(start as u32)?;

    let mut writer = WavWriter::create(output, spec)?;
    let count = ((end - start) * spec.channels as u64) as usize;
    let mut written = 0usize;
    for sample in reader.samples::<i16>().take(count) {
        writer.write_sample(sample?)?;
        written += 1;
    }
    writer.finalize()?;

    info!(
        "Cropped {} [{}, {}) frames into {}",
        input.display(),
        start,
        end,
        output.display()
    );
    Ok((written / spec.channels.max(1) as usize) as u64)
}
