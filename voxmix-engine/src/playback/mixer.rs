//! Timeline mixer for background beds and music
//!
//! The voice block arrives in the output buffer; every configured source
//! whose window overlaps the block is decoded, faded, optionally ducked
//! against the voice, and summed on top.
//!
//! # Architecture
//!
//! - Sources are visited in configuration order: bgm list, then music list
//! - Decoders open lazily when a window is entered and close when it is left
//! - Each source reads exactly the frames overlapping the block, at the
//!   offset `cursor - window_start` (wrapping when the source is shorter
//!   than its window)
//! - Summation happens in a 32-bit accumulator and is clamped once per
//!   sample, so the result does not depend on source order
//! - A source whose decoder fails is logged and contributes silence from
//!   then on; the mix keeps running. An interrupted decode is not a failure:
//!   it aborts the block and the source is retried on the next one
//!
//! Ducker state depends only on the voice. After a jump, the pipeline
//! replays the voice through [`Mixer::prime_duckers`] so ducking resumes
//! exactly where sequential playback would have it.

use crate::audio::{CroppedSource, FrameSource, StopFlag, TimedSourceDecoder};
use crate::config::SidechainConfig;
use crate::error::DecodeError;
use crate::playback::fader::FadeEnvelope;
use crate::playback::sidechain::SidechainDucker;
use tracing::{debug, warn};
use voxmix_common::pcm::clamp_i32;
use voxmix_common::timing::ms_to_frames;
use voxmix_common::{Config, FadeCurve, TimedAudioSource, TrackKind};

/// Opens the decoder for a source when its window starts.
pub type SourceOpener =
    Box<dyn Fn(TrackKind, &TimedAudioSource) -> Result<Box<dyn FrameSource>, DecodeError> + Send>;

/// Opener that decodes source URLs from disk with symphonia, applying each
/// source's crop range. Seeks abort once `stop` is raised.
pub fn decoder_opener(
    sample_rate: u32,
    channels: u16,
    retry_limit: u32,
    stop: StopFlag,
) -> SourceOpener {
    Box::new(move |kind, source| {
        let decoder = TimedSourceDecoder::with_retry_limit(
            &source.url,
            sample_rate,
            channels,
            kind,
            retry_limit,
        )?
        .with_stop_flag(stop.clone());
        if !source.is_cropped() {
            return Ok(Box::new(decoder) as Box<dyn FrameSource>);
        }
        let cropped = CroppedSource::new(
            Box::new(decoder),
            ms_to_frames(source.crop_start_time_ms, sample_rate),
            source
                .crop_end_time_ms
                .map(|ms| ms_to_frames(ms, sample_rate)),
        )?;
        Ok(Box::new(cropped) as Box<dyn FrameSource>)
    })
}

struct MixSource {
    kind: TrackKind,
    spec: TimedAudioSource,
    envelope: FadeEnvelope,
    ducker: Option<SidechainDucker>,
    decoder: Option<Box<dyn FrameSource>>,
    /// Frames since window start the open decoder has delivered
    consumed: u64,
    failed: bool,
    window: (u64, u64),
}

impl MixSource {
    /// Open (if needed) and position the decoder at `offset` frames past the
    /// window start.
    fn prepare(&mut self, offset: u64, opener: &SourceOpener) -> Result<(), DecodeError> {
        if self.decoder.is_none() {
            debug!("Opening {} source {}", self.kind, self.spec.url);
            self.decoder = Some(opener(self.kind, &self.spec)?);
            self.consumed = 0;
        }
        if self.consumed != offset {
            if let Some(decoder) = self.decoder.as_mut() {
                let target = match decoder.duration_frames() {
                    Some(duration) if duration > 0 => offset % duration,
                    _ => {
                        // Length unknown: walk toward the offset, which reaches
                        // end of stream (and so learns the length) if the
                        // source is shorter than the offset.
                        decoder.seek_to_frame(offset)?;
                        match decoder.duration_frames() {
                            Some(duration) if duration > 0 => offset % duration,
                            _ => offset,
                        }
                    }
                };
                decoder.seek_to_frame(target)?;
            }
            self.consumed = offset;
        }
        Ok(())
    }

    /// Read `frames` frames into `out`, looping; pads with silence if the
    /// source is empty.
    fn read_into(&mut self, out: &mut [i16], frames: usize, channels: usize) -> Result<(), DecodeError> {
        let mut filled = 0;
        if let Some(decoder) = self.decoder.as_mut() {
            while filled < frames {
                let n = decoder.read(&mut out[filled * channels..frames * channels], frames - filled, true)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
        }
        out[filled * channels..frames * channels].fill(0);
        self.consumed += frames as u64;
        Ok(())
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            debug!("Closed {} source {}", self.kind, self.spec.url);
        }
    }
}

/// Sums timed sources onto the voice.
pub struct Mixer {
    channels: u16,
    sources: Vec<MixSource>,
    opener: SourceOpener,
    accum: Vec<i32>,
    scratch: Vec<i16>,
    trigger: Vec<i16>,
}

impl Mixer {
    /// Build a mixer for every bgm and music source in `config`.
    pub fn new(
        config: &Config,
        sample_rate: u32,
        channels: u16,
        sidechain: &SidechainConfig,
        default_curve: FadeCurve,
        opener: SourceOpener,
    ) -> Self {
        let sources = config
            .sources()
            .map(|(kind, spec)| {
                let envelope = FadeEnvelope::for_source(spec, sample_rate, channels, default_curve);
                let ducker = spec.side_chain.then(|| {
                    SidechainDucker::new(sample_rate, channels, channels, sidechain, spec.make_up_gain)
                });
                MixSource {
                    kind,
                    spec: spec.clone(),
                    window: envelope.window_frames(),
                    envelope,
                    ducker,
                    decoder: None,
                    consumed: 0,
                    failed: false,
                }
            })
            .collect();

        Self {
            channels,
            sources,
            opener,
            accum: Vec::new(),
            scratch: Vec::new(),
            trigger: Vec::new(),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of sources with a decoder currently open.
    pub fn open_decoders(&self) -> usize {
        self.sources.iter().filter(|s| s.decoder.is_some()).count()
    }

    /// Number of sources that failed and now contribute silence.
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.failed).count()
    }

    /// Mix every source overlapping `[cursor, cursor + frame_count)` into
    /// `buffer`, which holds the voice for the same span. The voice is also
    /// the sidechain trigger.
    ///
    /// Only [`DecodeError::Interrupted`] is returned; `buffer` is then left
    /// holding the voice alone. Any other source error silences that source.
    pub fn mix_frame(
        &mut self,
        cursor_frame: u64,
        buffer: &mut [i16],
        frame_count: usize,
    ) -> Result<(), DecodeError> {
        let channels = self.channels as usize;
        let frame_count = frame_count.min(buffer.len() / channels);
        let samples = frame_count * channels;
        if frame_count == 0 || self.sources.is_empty() {
            return Ok(());
        }

        self.trigger.clear();
        self.trigger.extend_from_slice(&buffer[..samples]);
        self.accum.clear();
        self.accum.extend(buffer[..samples].iter().map(|&s| s as i32));
        self.scratch.resize(samples, 0);

        let block_end = cursor_frame + frame_count as u64;
        for source in self.sources.iter_mut() {
            let (window_start, window_end) = source.window;
            let start = cursor_frame.max(window_start);
            let end = block_end.min(window_end);
            if start >= end {
                if cursor_frame >= window_end {
                    source.close();
                }
                continue;
            }
            if source.failed {
                continue;
            }

            let frames = (end - start) as usize;
            let at = (start - cursor_frame) as usize * channels;
            let scratch = &mut self.scratch[..frames * channels];

            let result = match source.prepare(start - window_start, &self.opener) {
                Ok(()) => source.read_into(scratch, frames, channels),
                Err(e) => Err(e),
            };
            if let Err(DecodeError::Interrupted) = result {
                debug!("{} source {} interrupted", source.kind, source.spec.url);
                return Err(DecodeError::Interrupted);
            }
            if let Err(e) = result {
                warn!(
                    "{} source {} failed, continuing without it: {}",
                    source.kind, source.spec.url, e
                );
                source.failed = true;
                source.close();
                continue;
            }

            source.envelope.apply_at_frame(scratch, frames, start);
            if let Some(ducker) = source.ducker.as_mut() {
                ducker.apply(&self.trigger[at..at + frames * channels], scratch, frames);
            }
            for (acc, &s) in self.accum[at..at + frames * channels].iter_mut().zip(scratch.iter()) {
                *acc += s as i32;
            }

            if end == window_end {
                source.close();
            }
        }

        for (dst, &acc) in buffer[..samples].iter_mut().zip(self.accum.iter()) {
            *dst = clamp_i32(acc);
        }
        Ok(())
    }

    /// Reposition for a jump to `frame`. Ducker state is reset; decoders are
    /// re-sought lazily on the next block.
    ///
    /// Follow with [`Mixer::prime_duckers`] over the voice from
    /// [`Mixer::sidechain_replay_start`] to restore ducking state.
    pub fn seek(&mut self, frame: u64) {
        for source in self.sources.iter_mut() {
            if let Some(ducker) = source.ducker.as_mut() {
                ducker.reset();
            }
            let (window_start, window_end) = source.window;
            if frame < window_start || frame >= window_end {
                source.close();
            }
        }
    }

    /// Earliest frame the voice must be replayed from so every sidechained
    /// source active at `frame` has seen its whole trigger history.
    pub fn sidechain_replay_start(&self, frame: u64) -> Option<u64> {
        self.sources
            .iter()
            .filter(|s| s.ducker.is_some() && !s.failed)
            .map(|s| s.window)
            .filter(|&(window_start, window_end)| window_start < frame && frame < window_end)
            .map(|(window_start, _)| window_start)
            .min()
    }

    /// Feed `frame_count` voice frames starting at `cursor_frame` to the
    /// duckers whose windows overlap them, without mixing anything.
    pub fn prime_duckers(&mut self, cursor_frame: u64, trigger: &[i16], frame_count: usize) {
        let channels = self.channels as usize;
        let frame_count = frame_count.min(trigger.len() / channels);
        let block_end = cursor_frame + frame_count as u64;
        for source in self.sources.iter_mut() {
            let Some(ducker) = source.ducker.as_mut() else {
                continue;
            };
            let (window_start, window_end) = source.window;
            let start = cursor_frame.max(window_start);
            let end = block_end.min(window_end);
            if start >= end {
                continue;
            }
            let at = (start - cursor_frame) as usize * channels;
            let frames = (end - start) as usize;
            ducker.advance(&trigger[at..at + frames * channels], frames);
        }
    }
}
