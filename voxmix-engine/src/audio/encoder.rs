//! Output sinks for rendered PCM
//!
//! The engine hands a sink interleaved `i16` blocks; the sink decides the
//! container. WAV goes through hound; anything else is written as raw s16le.

use crate::audio::pcm_tools::is_wav_path;
use crate::error::SessionError;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for rendered audio.
pub trait PcmSink: Send {
    fn write(&mut self, samples: &[i16]) -> Result<(), SessionError>;

    /// Flush and close. Further writes are errors.
    fn finish(&mut self) -> Result<(), SessionError>;
}

/// RIFF/WAVE 16-bit integer writer.
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, channels: u16) -> Result<Self, SessionError> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)
            .map_err(|e| SessionError::Encode(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
        })
    }
}

impl PcmSink for WavSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), SessionError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SessionError::Encode(format!("{} already finished", self.path.display())))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| SessionError::Encode(e.to_string()))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SessionError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| SessionError::Encode(e.to_string()))?;
            debug!("Finalized {}", self.path.display());
        }
        Ok(())
    }
}

/// Headerless s16le writer.
pub struct RawPcmSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl RawPcmSink {
    pub fn create(path: &Path) -> Result<Self, SessionError> {
        let file = File::create(path).map_err(|source| SessionError::IoFailure {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }
}

impl PcmSink for RawPcmSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), SessionError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SessionError::Encode(format!("{} already finished", self.path.display())))?;
        for sample in samples {
            writer
                .write_all(&sample.to_le_bytes())
                .map_err(|e| SessionError::Encode(e.to_string()))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SessionError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| SessionError::Encode(e.to_string()))?;
        }
        Ok(())
    }
}

/// Pick a sink from the output extension: `.wav` → WAV, otherwise raw PCM.
pub fn create_sink(
    path: &Path,
    sample_rate: u32,
    channels: u16,
) -> Result<Box<dyn PcmSink>, SessionError> {
    if is_wav_path(path) {
        Ok(Box::new(WavSink::create(path, sample_rate, channels)?))
    } else {
        Ok(Box::new(RawPcmSink::create(path)?))
    }
}
