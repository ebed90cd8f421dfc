//! Streaming sample-rate conversion using rubato
//!
//! Decoders push arbitrary-sized blocks of interleaved audio; the resampler
//! feeds rubato fixed-size input chunks and appends whatever it produces.
//! When source and target rates match, audio passes through untouched.
//!
//! rubato's filter delays its output by [`Resampler::output_delay`] frames.
//! That many leading frames are dropped and the tail is drained with silence
//! on flush, so output frame `n` lines up with input time `n / ratio`.

use crate::error::DecodeError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Input frames handed to rubato per call.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Upper bound on silent chunks fed while draining the delayed tail.
const MAX_FLUSH_CHUNKS: usize = 8;

/// Stateful resampler for one decoder stream.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    channels: usize,
    input_rate: u32,
    output_rate: u32,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    /// Leading output frames still to drop
    delay_remaining: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    /// Create a resampler from `input_rate` to `output_rate`.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self, DecodeError> {
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "cannot resample {} Hz → {} Hz with {} channels",
                input_rate, output_rate, channels
            )));
        }

        let inner = if input_rate == output_rate {
            None
        } else {
            debug!(
                "Resampling from {}Hz to {}Hz ({} channels)",
                input_rate, output_rate, channels
            );
            let resampler = FastFixedIn::<f32>::new(
                output_rate as f64 / input_rate as f64,
                1.0,
                PolynomialDegree::Septic,
                RESAMPLE_CHUNK_FRAMES,
                channels as usize,
            )
            .map_err(|e| DecodeError::Resample(format!("Failed to create resampler: {}", e)))?;
            Some(resampler)
        };

        let delay_remaining = inner.as_ref().map_or(0, |r| r.output_delay());

        Ok(Self {
            inner,
            channels: channels as usize,
            input_rate,
            output_rate,
            pending: vec![Vec::with_capacity(RESAMPLE_CHUNK_FRAMES * 2); channels as usize],
            delay_remaining,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Feed interleaved input; append interleaved output to `out`.
    pub fn push(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<(), DecodeError> {
        if self.inner.is_none() {
            out.extend_from_slice(input);
            return Ok(());
        }

        for frame in input.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                self.pending[ch].push(sample);
            }
        }
        self.frames_in += (input.len() / self.channels) as u64;

        while let Some(resampler) = self.inner.as_mut() {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..needed).collect())
                .collect();
            let planar = resampler
                .process(&chunk, None)
                .map_err(|e| DecodeError::Resample(e.to_string()))?;
            self.emit(&planar, usize::MAX, out);
        }
        Ok(())
    }

    /// Interleave `planar` into `out` after dropping any outstanding delay.
    fn emit(&mut self, planar: &[Vec<f32>], max_frames: usize, out: &mut Vec<f32>) {
        let produced = planar.first().map_or(0, Vec::len);
        let skip = self.delay_remaining.min(produced);
        self.delay_remaining -= skip;
        self.frames_out += interleave_into(planar, skip, max_frames, out) as u64;
    }

    /// Drain buffered input at end of stream.
    ///
    /// The final partial chunk and the delayed tail are zero-padded by
    /// rubato; output is trimmed so the total frame count matches the input
    /// duration at the output rate.
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<(), DecodeError> {
        let expected = voxmix_common::timing::rescale_frames(
            self.frames_in,
            self.input_rate,
            self.output_rate,
        );
        let mut feed_pending = !self.pending[0].is_empty();

        for _ in 0..MAX_FLUSH_CHUNKS {
            if self.frames_out >= expected {
                break;
            }
            let Some(resampler) = self.inner.as_mut() else {
                break;
            };
            let planar = if feed_pending {
                resampler.process_partial(Some(self.pending.as_slice()), None)
            } else {
                resampler.process_partial(None::<&[Vec<f32>]>, None)
            }
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
            feed_pending = false;

            let remaining = expected.saturating_sub(self.frames_out) as usize;
            self.emit(&planar, remaining, out);
        }

        for ch in self.pending.iter_mut() {
            ch.clear();
        }
        Ok(())
    }

    /// Forget buffered input and filter history.
    pub fn reset(&mut self) {
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
        for ch in self.pending.iter_mut() {
            ch.clear();
        }
        self.delay_remaining = self.inner.as_ref().map_or(0, |r| r.output_delay());
        self.frames_in = 0;
        self.frames_out = 0;
    }
}

/// Convert planar format to interleaved samples.
///
/// Input:  [[L, L, L, ...], [R, R, R, ...]]
/// Output: [L, R, L, R, L, R, ...]
///
/// Skips the first `skip` frames, then writes at most `max_frames` frames;
/// returns the number written.
fn interleave_into(
    planar: &[Vec<f32>],
    skip: usize,
    max_frames: usize,
    out: &mut Vec<f32>,
) -> usize {
    if planar.is_empty() {
        return 0;
    }
    let frames = planar[0].len().saturating_sub(skip).min(max_frames);
    out.reserve(frames * planar.len());
    for frame_idx in skip..skip + frames {
        for channel in planar {
            out.push(channel[frame_idx]);
        }
    }
    frames
}
