//! Streaming audio decoder using symphonia
//!
//! Decodes compressed or PCM containers (MP3, AAC/M4A, FLAC, Vorbis, WAV)
//! into interleaved `i16` at a caller-chosen sample rate and channel count.
//!
//! **Positioning:** seeks never use compressed-domain seeking. A backward
//! seek reopens the stream and decodes forward from the start; a forward seek
//! decodes and discards. A seek therefore lands on exactly the same sample a
//! sequential read would have reached. The skip polls the decoder's
//! [`StopFlag`] between blocks, so a stop is honored during a long seek.

use crate::audio::resampler::StreamResampler;
use crate::audio::{FrameSource, StopFlag};
use crate::backend::backend;
use crate::error::DecodeError;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};
use voxmix_common::pcm::{f32_to_i16, remix_channels};
use voxmix_common::timing::{ms_to_frames, rescale_frames};
use voxmix_common::TrackKind;

/// Decoder slots are keyed by the same kinds as configuration sources.
pub type DecoderSlot = TrackKind;

/// Largest supported output channel count.
pub const MAX_CHANNELS: u16 = 8;

/// Default tolerance for consecutive packet failures.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Container reader plus codec for one open file.
struct SymphoniaStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    n_frames: Option<u64>,
    sample_rate: Option<u32>,
}

/// Format of one decoded block.
struct BlockSpec {
    sample_rate: u32,
    channels: u16,
}

impl SymphoniaStream {
    fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = std::fs::File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = backend()
            .probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!("probe failed: {}", e),
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: "no audio track".to_string(),
            })?;

        let decoder = backend()
            .codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!("no decoder: {}", e),
            })?;

        Ok(Self {
            track_id: track.id,
            n_frames: track.codec_params.n_frames,
            sample_rate: track.codec_params.sample_rate,
            format,
            decoder,
        })
    }

    /// Decode the next packet of our track into `out` (interleaved f32).
    ///
    /// Returns `None` at end of stream. Consecutive failures beyond
    /// `retry_limit` abort with an error.
    fn next_block(
        &mut self,
        path: &Path,
        retry_limit: u32,
        out: &mut Vec<f32>,
    ) -> Result<Option<BlockSpec>, DecodeError> {
        let mut io_failures = 0u32;
        let mut decode_failures = 0u32;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of {}", path.display());
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Stream reset required in {}, treating as end", path.display());
                    return Ok(None);
                }
                Err(SymphoniaError::IoError(e)) => {
                    io_failures += 1;
                    if io_failures > retry_limit {
                        return Err(DecodeError::Io {
                            path: path.to_path_buf(),
                            attempts: io_failures,
                            reason: e.to_string(),
                        });
                    }
                    warn!("Error reading packet from {}: {} (retrying)", path.display(), e);
                    continue;
                }
                Err(e) => {
                    decode_failures += 1;
                    if decode_failures > retry_limit {
                        return Err(DecodeError::Corrupt {
                            path: path.to_path_buf(),
                            failures: decode_failures,
                        });
                    }
                    warn!("Error reading packet from {}: {}", path.display(), e);
                    continue;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);
                    out.extend_from_slice(samples.samples());
                    return Ok(Some(BlockSpec {
                        sample_rate: spec.rate,
                        channels: spec.channels.count() as u16,
                    }));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    decode_failures += 1;
                    if decode_failures > retry_limit {
                        return Err(DecodeError::Corrupt {
                            path: path.to_path_buf(),
                            failures: decode_failures,
                        });
                    }
                    warn!("Decode error in {}: {}", path.display(), msg);
                }
                Err(SymphoniaError::IoError(e)) => {
                    io_failures += 1;
                    if io_failures > retry_limit {
                        return Err(DecodeError::Io {
                            path: path.to_path_buf(),
                            attempts: io_failures,
                            reason: e.to_string(),
                        });
                    }
                    warn!("I/O error decoding {}: {} (retrying)", path.display(), e);
                }
                Err(e) => {
                    return Err(DecodeError::Unsupported {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}

/// Seekable, loopable decoder producing PCM at a fixed output format.
///
/// Each instance owns its own cursor; a bgm handle and a music handle on the
/// same file never interfere.
pub struct TimedSourceDecoder {
    path: PathBuf,
    slot: DecoderSlot,
    target_rate: u32,
    target_channels: u16,
    retry_limit: u32,
    stream: SymphoniaStream,
    resampler: Option<StreamResampler>,
    source_channels: u16,
    /// Decoded output not yet handed out
    buffered: VecDeque<i16>,
    /// Output frame index of the first buffered frame
    position: u64,
    end_of_stream: bool,
    /// Length reported by the container
    duration_frames: Option<u64>,
    /// Length observed on reaching end of stream
    measured_frames: Option<u64>,
    stop: Option<StopFlag>,
    block: Vec<f32>,
    resampled: Vec<f32>,
    converted: Vec<i16>,
    remixed: Vec<i16>,
}

impl TimedSourceDecoder {
    /// Open `path` for decoding into `target_rate` Hz × `target_channels`.
    pub fn create(
        path: impl AsRef<Path>,
        target_rate: u32,
        target_channels: u16,
        slot: DecoderSlot,
    ) -> Result<Self, DecodeError> {
        Self::with_retry_limit(path, target_rate, target_channels, slot, DEFAULT_RETRY_LIMIT)
    }

    pub fn with_retry_limit(
        path: impl AsRef<Path>,
        target_rate: u32,
        target_channels: u16,
        slot: DecoderSlot,
        retry_limit: u32,
    ) -> Result<Self, DecodeError> {
        let path = path.as_ref().to_path_buf();
        if target_rate == 0 || target_channels == 0 || target_channels > MAX_CHANNELS {
            return Err(DecodeError::InvalidFormat(format!(
                "{} Hz × {} channels",
                target_rate, target_channels
            )));
        }

        let stream = SymphoniaStream::open(&path)?;
        let duration_frames = match (stream.n_frames, stream.sample_rate) {
            (Some(frames), Some(rate)) => Some(rescale_frames(frames, rate, target_rate)),
            _ => None,
        };

        debug!(
            "Opened {} decoder for {} (duration {:?} frames at {}Hz)",
            slot,
            path.display(),
            duration_frames,
            target_rate
        );

        Ok(Self {
            path,
            slot,
            target_rate,
            target_channels,
            retry_limit,
            stream,
            resampler: None,
            source_channels: 0,
            buffered: VecDeque::new(),
            position: 0,
            end_of_stream: false,
            duration_frames,
            measured_frames: None,
            stop: None,
            block: Vec::new(),
            resampled: Vec::new(),
            converted: Vec::new(),
            remixed: Vec::new(),
        })
    }

    /// Abort seeks with [`DecodeError::Interrupted`] once `stop` is raised.
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn duration_ms(&self) -> Option<u64> {
        FrameSource::duration_frames(self)
            .map(|f| voxmix_common::timing::frames_to_ms(f, self.target_rate))
    }

    /// Seek to `ms` milliseconds from the start of the file.
    pub fn seek_to(&mut self, ms: u64) -> Result<(), DecodeError> {
        self.seek_to_frame(ms_to_frames(ms, self.target_rate))
    }

    fn check_stop(&self) -> Result<(), DecodeError> {
        match &self.stop {
            Some(stop) if stop.is_raised() => Err(DecodeError::Interrupted),
            _ => Ok(()),
        }
    }

    fn frames_buffered(&self) -> usize {
        self.buffered.len() / self.target_channels as usize
    }

    fn discard_frames(&mut self, frames: usize) {
        let samples = frames * self.target_channels as usize;
        self.buffered.drain(..samples);
        self.position += frames as u64;
    }

    /// Reopen the file and start again from frame 0.
    fn rewind(&mut self) -> Result<(), DecodeError> {
        debug!("Rewinding {} decoder for {}", self.slot, self.path.display());
        self.stream = SymphoniaStream::open(&self.path)?;
        self.resampler = None;
        self.buffered.clear();
        self.position = 0;
        self.end_of_stream = false;
        Ok(())
    }

    /// Decode one more block into `buffered`; sets `end_of_stream` when done.
    fn decode_next_block(&mut self) -> Result<(), DecodeError> {
        self.block.clear();
        self.resampled.clear();

        match self
            .stream
            .next_block(&self.path, self.retry_limit, &mut self.block)?
        {
            Some(spec) => {
                if self.resampler.is_none() || spec.channels != self.source_channels {
                    self.resampler = Some(StreamResampler::new(
                        spec.sample_rate,
                        self.target_rate,
                        spec.channels,
                    )?);
                    self.source_channels = spec.channels;
                }
                if let Some(resampler) = self.resampler.as_mut() {
                    resampler.push(&self.block, &mut self.resampled)?;
                }
            }
            None => {
                if let Some(resampler) = self.resampler.as_mut() {
                    resampler.flush(&mut self.resampled)?;
                }
                self.end_of_stream = true;
            }
        }

        if !self.resampled.is_empty() {
            self.converted.clear();
            self.converted
                .extend(self.resampled.iter().map(|&s| f32_to_i16(s)));
            self.remixed.clear();
            remix_channels(
                &self.converted,
                self.source_channels,
                self.target_channels,
                &mut self.remixed,
            );
            self.buffered.extend(self.remixed.iter().copied());
        }
        if self.end_of_stream && self.measured_frames.is_none() {
            self.measured_frames = Some(self.position + self.frames_buffered() as u64);
        }
        Ok(())
    }
}

impl FrameSource for TimedSourceDecoder {
    fn channels(&self) -> u16 {
        self.target_channels
    }

    /// The observed length once the stream has been decoded to its end,
    /// otherwise what the container reported.
    fn duration_frames(&self) -> Option<u64> {
        self.measured_frames.or(self.duration_frames)
    }

    /// Seek to an output frame.
    ///
    /// - inside the buffered region: buffered frames are dropped, nothing is decoded
    /// - ahead of it: decode and skip
    /// - behind it: reopen, then decode and skip
    /// - past the end: legal; the next read reports end of stream
    ///
    /// A raised stop flag aborts the skip with [`DecodeError::Interrupted`];
    /// the position reached so far is kept and a later seek resumes from it.
    fn seek_to_frame(&mut self, frame: u64) -> Result<(), DecodeError> {
        if frame < self.position {
            self.rewind()?;
        }

        loop {
            let skip = (frame - self.position).min(self.frames_buffered() as u64) as usize;
            self.discard_frames(skip);
            if self.position == frame {
                return Ok(());
            }
            if self.end_of_stream {
                debug!(
                    "Seek to frame {} is past the end of {}",
                    frame,
                    self.path.display()
                );
                self.position = frame;
                return Ok(());
            }
            self.check_stop()?;
            self.decode_next_block()?;
        }
    }

    /// Read up to `max_frames` frames. Returns 0 at end of stream unless
    /// `looping`, in which case the stream wraps to its start.
    fn read(
        &mut self,
        out: &mut [i16],
        max_frames: usize,
        looping: bool,
    ) -> Result<usize, DecodeError> {
        let channels = self.target_channels as usize;
        let max_frames = max_frames.min(out.len() / channels);
        let mut written = 0;
        let mut rewound_without_data = false;

        while written < max_frames {
            while self.frames_buffered() < max_frames - written && !self.end_of_stream {
                self.decode_next_block()?;
            }

            let available = self.frames_buffered();
            if available == 0 {
                if !looping || rewound_without_data {
                    break;
                }
                self.rewind()?;
                rewound_without_data = true;
                continue;
            }
            rewound_without_data = false;

            let take = available.min(max_frames - written);
            let dst = &mut out[written * channels..(written + take) * channels];
            for (d, s) in dst.iter_mut().zip(self.buffered.drain(..take * channels)) {
                *d = s;
            }
            written += take;
            self.position += take as u64;
        }

        Ok(written)
    }
}
