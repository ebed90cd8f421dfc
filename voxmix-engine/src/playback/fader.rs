//! Fade envelope for timed sources
//!
//! A source is audible only inside its window `[start, end)` on the absolute
//! session timeline. Inside the window the gain ramps up over the fade-in,
//! holds at the base volume, and ramps down over the fade-out:
//!
//! ```text
//!  gain
//!  base ┤      ┌──────────────┐
//!       │     /                \
//!     0 ┼────┘                  └────
//!           start  +fadeIn  end-fadeOut  end
//! ```
//!
//! Gain depends only on the absolute frame index, never on buffer
//! boundaries, so a source rendered in 1-frame blocks or in one 10-second
//! block produces identical samples.

use voxmix_common::pcm::scale_i16;
use voxmix_common::timing::ms_to_frames;
use voxmix_common::{FadeCurve, TimedAudioSource};

/// Per-frame gain envelope for one timed source.
///
/// # Examples
///
/// ```ignore
/// // 80% volume, audible 5 s – 17 s, 3 s fades, 44.1 kHz stereo
/// let envelope = FadeEnvelope::new(44_100, 2, 5_000, 17_000, 80, 3_000, 3_000);
/// envelope.apply(&mut buffer, frames, 6_500);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FadeEnvelope {
    sample_rate: u32,
    channels: u16,
    window_start: u64,
    window_end: u64,
    base_gain: f32,
    fade_in_frames: u64,
    fade_out_frames: u64,
    curve: FadeCurve,
}

impl FadeEnvelope {
    /// Build an envelope. Fades longer than half the window are truncated to
    /// half the window; `volume` is a 0–100 linear percentage.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        window_start_ms: u64,
        window_end_ms: u64,
        volume: u8,
        fade_in_ms: u64,
        fade_out_ms: u64,
    ) -> Self {
        let window_start = ms_to_frames(window_start_ms, sample_rate);
        let window_end = ms_to_frames(window_end_ms, sample_rate).max(window_start);
        let half = (window_end - window_start) / 2;

        Self {
            sample_rate,
            channels: channels.max(1),
            window_start,
            window_end,
            base_gain: volume.min(100) as f32 / 100.0,
            fade_in_frames: ms_to_frames(fade_in_ms, sample_rate).min(half),
            fade_out_frames: ms_to_frames(fade_out_ms, sample_rate).min(half),
            curve: FadeCurve::Linear,
        }
    }

    /// Envelope for a configured source; `default_curve` applies when the
    /// source does not name one.
    pub fn for_source(
        source: &TimedAudioSource,
        sample_rate: u32,
        channels: u16,
        default_curve: FadeCurve,
    ) -> Self {
        Self::new(
            sample_rate,
            channels,
            source.start_time_ms,
            source.end_time_ms,
            source.volume,
            source.fade_in_time_ms,
            source.fade_out_time_ms,
        )
        .with_curve(source.fade_curve.unwrap_or(default_curve))
    }

    pub fn with_curve(mut self, curve: FadeCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Window as absolute frames `[start, end)`.
    pub fn window_frames(&self) -> (u64, u64) {
        (self.window_start, self.window_end)
    }

    /// Gain at absolute frame `frame`.
    pub fn gain_at_frame(&self, frame: u64) -> f32 {
        if frame < self.window_start || frame >= self.window_end {
            return 0.0;
        }

        let since_start = frame - self.window_start;
        let until_end = self.window_end - frame;

        if self.fade_in_frames > 0 && since_start < self.fade_in_frames {
            let t = since_start as f32 / self.fade_in_frames as f32;
            return self.base_gain * self.curve.calculate_fade_in(t);
        }
        if self.fade_out_frames > 0 && until_end <= self.fade_out_frames {
            let t = (self.fade_out_frames - until_end) as f32 / self.fade_out_frames as f32;
            return self.base_gain * self.curve.calculate_fade_out(t);
        }
        self.base_gain
    }

    /// Apply the envelope in place to `frame_count` interleaved frames that
    /// start at absolute time `buffer_start_ms`.
    pub fn apply(&self, buffer: &mut [i16], frame_count: usize, buffer_start_ms: u64) {
        self.apply_at_frame(buffer, frame_count, ms_to_frames(buffer_start_ms, self.sample_rate));
    }

    /// Apply the envelope to frames starting at absolute frame `start_frame`.
    pub fn apply_at_frame(&self, buffer: &mut [i16], frame_count: usize, start_frame: u64) {
        let channels = self.channels as usize;
        let frame_count = frame_count.min(buffer.len() / channels);

        for (i, frame) in buffer[..frame_count * channels]
            .chunks_exact_mut(channels)
            .enumerate()
        {
            let gain = self.gain_at_frame(start_frame + i as u64);
            for sample in frame {
                *sample = scale_i16(*sample, gain);
            }
        }
    }
}
