//! Session pipelines
//!
//! A pipeline turns the voice recording into output frames one work unit at
//! a time. The session drives it; the pipeline never looks at session state,
//! only at the session's [`StopFlag`] during long seeks.

use super::SessionSpec;
use crate::audio::{FrameSource, StopFlag};
use crate::config::EngineConfig;
use crate::effects::EffectChain;
use crate::error::SessionError;
use crate::playback::{decoder_opener, Mixer, PeakLimiter};
use tracing::{debug, info};
use voxmix_common::timing::ms_to_frames;

/// Master limiter timing; the ceiling comes from [`EngineConfig`].
const MASTER_ATTACK_MS: f32 = 0.0;
const MASTER_RELEASE_MS: f32 = 50.0;

/// Mixed and discarded ahead of a seek target so the master limiter settles
/// to the state sequential playback has there (ten release time constants).
const SEEK_LEAD_IN_MS: u64 = 500;

pub trait Pipeline: Send + Sized + 'static {
    /// Label for logs and errors.
    const KIND: &'static str;

    /// Open every input. Seeks inside the pipeline give up with
    /// [`SessionError::Cancelled`] once `stop` is raised.
    fn build(spec: &SessionSpec, engine: &EngineConfig, stop: &StopFlag)
        -> Result<Self, SessionError>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Total output length, when the voice reports it.
    fn duration_frames(&self) -> Option<u64>;

    fn position_frames(&self) -> u64;

    fn seek_to_frame(&mut self, frame: u64) -> Result<(), SessionError>;

    /// Produce up to `max_frames` frames into `out`. Returns 0 at end of
    /// stream.
    fn pull(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize, SessionError>;
}

/// Voice through the effect chain, at the voice's own channel count.
pub struct EffectsPipeline {
    voice: Box<dyn FrameSource>,
    chain: EffectChain,
    sample_rate: u32,
    channels: u16,
    position: u64,
}

impl Pipeline for EffectsPipeline {
    const KIND: &'static str = "effects";

    fn build(
        spec: &SessionSpec,
        engine: &EngineConfig,
        stop: &StopFlag,
    ) -> Result<Self, SessionError> {
        let channels = spec.voice.channels;
        let voice = spec.voice.open(channels, engine.decode_retry_limit, stop)?;
        let mut chain = EffectChain::new(spec.voice.sample_rate, channels);
        // Rejected effects are logged by the chain and simply not applied.
        chain.configure(&spec.config.effects);
        info!(
            "Effects pipeline: {} Hz × {} ch, active {:?}",
            spec.voice.sample_rate,
            channels,
            chain.active_effects()
        );

        Ok(Self {
            voice,
            chain,
            sample_rate: spec.voice.sample_rate,
            channels,
            position: 0,
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn duration_frames(&self) -> Option<u64> {
        self.voice.duration_frames()
    }

    fn position_frames(&self) -> u64 {
        self.position
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<(), SessionError> {
        self.voice.seek_to_frame(frame)?;
        self.chain.reset();
        self.position = frame;
        Ok(())
    }

    fn pull(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize, SessionError> {
        let n = self.voice.read(out, max_frames, false)?;
        let samples = n * self.channels as usize;
        self.chain.apply(&mut out[..samples]);
        self.position += n as u64;
        Ok(n)
    }
}

/// Voice plus timed beds and music, optionally limited.
///
/// A seek lands on the same output sequential playback produces: ducker
/// state is replayed exactly from the voice, and the master limiter is
/// settled by mixing a short discarded lead-in before the target.
pub struct MixPipeline {
    voice: Box<dyn FrameSource>,
    mixer: Mixer,
    limiter: Option<PeakLimiter>,
    stop: StopFlag,
    scratch: Vec<f32>,
    /// Voice frames read while seeking
    lead_in: Vec<i16>,
    block_frames: usize,
    sample_rate: u32,
    channels: u16,
    position: u64,
}

impl MixPipeline {
    /// Read the voice over `[from, to)` and either mix and limit it (output
    /// discarded) or only feed it to the duckers.
    fn run_voice(&mut self, from: u64, to: u64, mix: bool) -> Result<(), SessionError> {
        let channels = self.channels as usize;
        self.lead_in.resize(self.block_frames * channels, 0);
        let mut cursor = from;
        while cursor < to {
            if self.stop.is_raised() {
                return Err(SessionError::Cancelled);
            }
            let want = (to - cursor).min(self.block_frames as u64) as usize;
            let n = self.voice.read(&mut self.lead_in[..want * channels], want, false)?;
            if n == 0 {
                break;
            }
            let block = &mut self.lead_in[..n * channels];
            if mix {
                self.mixer.mix_frame(cursor, block, n)?;
                if let Some(limiter) = self.limiter.as_mut() {
                    limiter.process_i16(block, &mut self.scratch);
                }
            } else {
                self.mixer.prime_duckers(cursor, block, n);
            }
            cursor += n as u64;
        }
        Ok(())
    }
}

impl Pipeline for MixPipeline {
    const KIND: &'static str = "mix";

    fn build(
        spec: &SessionSpec,
        engine: &EngineConfig,
        stop: &StopFlag,
    ) -> Result<Self, SessionError> {
        let sample_rate = spec.voice.sample_rate;
        let channels = engine.mix_channels;
        let voice = spec.voice.open(channels, engine.decode_retry_limit, stop)?;

        let mixer = Mixer::new(
            &spec.config,
            sample_rate,
            channels,
            &engine.sidechain,
            engine.default_fade_curve,
            decoder_opener(sample_rate, channels, engine.decode_retry_limit, stop.clone()),
        );
        let limiter = engine.master_limiter.then(|| {
            PeakLimiter::new(
                sample_rate,
                channels,
                engine.master_limiter_threshold_db,
                MASTER_ATTACK_MS,
                MASTER_RELEASE_MS,
            )
        });
        info!(
            "Mix pipeline: {} Hz × {} ch, {} sources, master limiter {}",
            sample_rate,
            channels,
            mixer.source_count(),
            if limiter.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            voice,
            mixer,
            limiter,
            stop: stop.clone(),
            scratch: Vec::new(),
            lead_in: Vec::new(),
            block_frames: engine.chunk_frames.max(1),
            sample_rate,
            channels,
            position: 0,
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn duration_frames(&self) -> Option<u64> {
        self.voice.duration_frames()
    }

    fn position_frames(&self) -> u64 {
        self.position
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<(), SessionError> {
        let lead_in = if self.limiter.is_some() {
            ms_to_frames(SEEK_LEAD_IN_MS, self.sample_rate)
        } else {
            0
        };
        let settle_start = frame.saturating_sub(lead_in);
        self.mixer.seek(settle_start);
        if let Some(limiter) = self.limiter.as_mut() {
            limiter.reset();
        }

        if let Some(replay_start) = self.mixer.sidechain_replay_start(settle_start) {
            debug!(
                "Replaying voice frames {}..{} into sidechain duckers",
                replay_start, settle_start
            );
            self.voice.seek_to_frame(replay_start)?;
            self.run_voice(replay_start, settle_start, false)?;
        }
        self.voice.seek_to_frame(settle_start)?;
        self.run_voice(settle_start, frame, true)?;

        self.voice.seek_to_frame(frame)?;
        self.position = frame;
        Ok(())
    }

    fn pull(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize, SessionError> {
        let n = self.voice.read(out, max_frames, false)?;
        if n == 0 {
            return Ok(0);
        }
        let samples = n * self.channels as usize;
        self.mixer.mix_frame(self.position, &mut out[..samples], n)?;
        if let Some(limiter) = self.limiter.as_mut() {
            limiter.process_i16(&mut out[..samples], &mut self.scratch);
        }
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VoiceInput;
    use voxmix_common::Config;

    fn write_voice(path: &std::path::Path, frames: usize) {
        let bytes: Vec<u8> = (0..frames)
            .flat_map(|i| (((i % 64) as i16 - 32) * 300).to_le_bytes())
            .collect();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_raised_stop_cancels_mix_seek() {
        let dir = tempfile::tempdir().unwrap();
        let voice = dir.path().join("voice.pcm");
        write_voice(&voice, 16_000);

        let spec = SessionSpec::new(VoiceInput::new(&voice, 8_000, 1), Config::default());
        let stop = StopFlag::new();
        let mut pipeline = MixPipeline::build(&spec, &EngineConfig::default(), &stop).unwrap();

        stop.raise();
        assert!(matches!(
            pipeline.seek_to_frame(12_000),
            Err(SessionError::Cancelled)
        ));

        stop.clear();
        pipeline.seek_to_frame(12_000).unwrap();
        assert_eq!(pipeline.position_frames(), 12_000);
    }

    #[test]
    fn test_mix_seek_without_sources_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let voice = dir.path().join("voice.pcm");
        write_voice(&voice, 12_000);

        let spec = SessionSpec::new(VoiceInput::new(&voice, 8_000, 1), Config::default());
        let engine = EngineConfig::default();
        let stop = StopFlag::new();
        let channels = engine.mix_channels as usize;

        let mut sequential = MixPipeline::build(&spec, &engine, &stop).unwrap();
        let mut full = vec![0i16; 12_000 * channels];
        let mut filled = 0;
        while filled < 12_000 {
            let n = sequential
                .pull(&mut full[filled * channels..], 12_000 - filled)
                .unwrap();
            assert!(n > 0);
            filled += n;
        }

        let mut seeking = MixPipeline::build(&spec, &engine, &stop).unwrap();
        seeking.seek_to_frame(7_000).unwrap();
        let mut tail = vec![0i16; 5_000 * channels];
        let n = seeking.pull(&mut tail, 5_000).unwrap();
        assert_eq!(n, 5_000);
        assert_eq!(tail[..], full[7_000 * channels..]);
    }
}
