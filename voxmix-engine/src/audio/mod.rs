//! Audio I/O: decoding, raw PCM input, resampling, encoding
//!
//! Every input, whether a compressed bed or the raw voice recording, is
//! exposed as a [`FrameSource`] producing interleaved `i16` at the session's
//! output format.

pub mod crop;
pub mod decoder;
pub mod encoder;
pub mod pcm_reader;
pub mod pcm_tools;
pub mod resampler;
pub mod transcode;

pub use crop::CroppedSource;
pub use decoder::{DecoderSlot, TimedSourceDecoder};
pub use encoder::{create_sink, PcmSink, RawPcmSink, WavSink};
pub use pcm_reader::PcmFileReader;
pub use transcode::Transcoder;

use crate::error::{DecodeError, SessionError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use voxmix_common::TrackKind;

/// Shared stop request, raised by a controller and polled by long-running
/// decode loops.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A seekable stream of interleaved `i16` frames.
pub trait FrameSource: Send {
    /// Output channel count.
    fn channels(&self) -> u16;

    /// Total length in output frames, when the container reports it.
    fn duration_frames(&self) -> Option<u64>;

    /// Position the next read at `frame`. Seeking past the end is legal.
    fn seek_to_frame(&mut self, frame: u64) -> Result<(), DecodeError>;

    /// Read up to `max_frames` frames into `out`; 0 means end of stream.
    fn read(&mut self, out: &mut [i16], max_frames: usize, looping: bool)
        -> Result<usize, DecodeError>;
}

/// How the primary voice recording is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceFormat {
    /// Headerless signed 16-bit little-endian PCM
    RawPcm,
    /// Any container symphonia can probe
    Container,
}

impl VoiceFormat {
    /// Guess from the file extension: `.pcm`/`.raw` are raw, anything else is probed.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("pcm") | Some("raw") => VoiceFormat::RawPcm,
            _ => VoiceFormat::Container,
        }
    }
}

/// The primary voice track of a session.
///
/// Its sample rate becomes the session's output rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInput {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: VoiceFormat,
}

impl VoiceInput {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Self {
        let path = path.into();
        let format = VoiceFormat::from_path(&path);
        Self {
            path,
            sample_rate,
            channels,
            format,
        }
    }

    /// Open the voice as a frame source with `output_channels` channels.
    ///
    /// Container voices poll `stop` while skipping during a seek.
    pub fn open(
        &self,
        output_channels: u16,
        retry_limit: u32,
        stop: &StopFlag,
    ) -> Result<Box<dyn FrameSource>, SessionError> {
        if self.sample_rate == 0 || self.channels == 0 || self.channels > decoder::MAX_CHANNELS {
            return Err(SessionError::Decode(DecodeError::InvalidFormat(format!(
                "voice {} Hz × {} channels",
                self.sample_rate, self.channels
            ))));
        }
        match self.format {
            VoiceFormat::RawPcm => {
                let reader =
                    PcmFileReader::open(&self.path, self.sample_rate, self.channels, output_channels)
                        .map_err(|source| SessionError::IoFailure {
                            path: self.path.clone(),
                            source,
                        })?;
                Ok(Box::new(reader))
            }
            VoiceFormat::Container => {
                if !self.path.exists() {
                    return Err(SessionError::IoFailure {
                        path: self.path.clone(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    });
                }
                // The voice never shares a slot with beds; Music is just a label here.
                let decoder = TimedSourceDecoder::with_retry_limit(
                    &self.path,
                    self.sample_rate,
                    output_channels,
                    TrackKind::Music,
                    retry_limit,
                )?
                .with_stop_flag(stop.clone());
                Ok(Box::new(decoder))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_format_from_extension() {
        assert_eq!(VoiceFormat::from_path(Path::new("a.pcm")), VoiceFormat::RawPcm);
        assert_eq!(VoiceFormat::from_path(Path::new("a.RAW")), VoiceFormat::RawPcm);
        assert_eq!(VoiceFormat::from_path(Path::new("a.wav")), VoiceFormat::Container);
        assert_eq!(VoiceFormat::from_path(Path::new("voice")), VoiceFormat::Container);
    }

    #[test]
    fn test_missing_voice_is_io_failure() {
        let input = VoiceInput::new("/nonexistent/voice.pcm", 44_100, 1);
        let stop = StopFlag::new();
        assert!(matches!(input.open(2, 3, &stop), Err(SessionError::IoFailure { .. })));
        let input = VoiceInput::new("/nonexistent/voice.m4a", 44_100, 1);
        assert!(matches!(input.open(2, 3, &stop), Err(SessionError::IoFailure { .. })));
    }

    #[test]
    fn test_stop_flag_clones_share_state() {
        let flag = StopFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_raised());
        flag.raise();
        assert!(observer.is_raised());
        observer.clear();
        assert!(!flag.is_raised());
    }
}
