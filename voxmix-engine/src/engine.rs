//! Engine façade
//!
//! [`AudioEngine`] bundles everything a host application drives:
//! - one effects session and one mix session, fully independent
//! - two standalone decoder slots (bgm, music) for previewing sources
//! - one standalone fade envelope for hosts that fade their own buffers
//! - one file-to-file transcoder
//!
//! Creating an engine initializes the process-wide codec backend (once).

use crate::audio::{create_sink, DecoderSlot, FrameSource, TimedSourceDecoder, Transcoder};
use crate::backend::backend;
use crate::config::EngineConfig;
use crate::error::{Error, Result, SessionError};
use crate::playback::FadeEnvelope;
use crate::session::{
    EffectsSession, MixSession, RenderOutcome, Pipeline, Session, SessionSpec, SessionState,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use voxmix_common::TrackKind;

pub struct AudioEngine {
    engine_config: EngineConfig,
    effects: Arc<EffectsSession>,
    mix: Arc<MixSession>,
    bgm_decoder: Mutex<Option<TimedSourceDecoder>>,
    music_decoder: Mutex<Option<TimedSourceDecoder>>,
    fade: Mutex<Option<FadeEnvelope>>,
    transcoder: Transcoder,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioEngine {
    pub fn new(engine_config: EngineConfig) -> Self {
        backend();
        info!(
            "Audio engine created (chunk {} frames, mix {} ch)",
            engine_config.chunk_frames, engine_config.mix_channels
        );
        Self {
            transcoder: Transcoder::new(&engine_config),
            effects: Arc::new(Session::new(engine_config.clone())),
            mix: Arc::new(Session::new(engine_config.clone())),
            engine_config,
            bgm_decoder: Mutex::new(None),
            music_decoder: Mutex::new(None),
            fade: Mutex::new(None),
        }
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn effects_session(&self) -> &Arc<EffectsSession> {
        &self.effects
    }

    pub fn mix_session(&self) -> &Arc<MixSession> {
        &self.mix
    }

    // ----- effects -----

    pub fn effects_init(&self, spec: &SessionSpec) -> std::result::Result<(), SessionError> {
        self.effects.init(spec)
    }

    pub fn effects_seek_to(&self, ms: u64) -> std::result::Result<(), SessionError> {
        self.effects.seek_to(ms)
    }

    pub fn get_effects_frame(
        &self,
        buffer: &mut [i16],
        max_frames: usize,
    ) -> std::result::Result<usize, SessionError> {
        self.effects.get_frame(buffer, max_frames)
    }

    pub fn render_effects(&self, out_path: &Path) -> std::result::Result<RenderOutcome, SessionError> {
        render_to(&self.effects, out_path)
    }

    pub fn stop_effects(&self) {
        self.effects.stop();
    }

    pub fn effects_progress(&self) -> u8 {
        self.effects.progress()
    }

    // ----- mix -----

    pub fn mixer_init(&self, spec: &SessionSpec) -> std::result::Result<(), SessionError> {
        self.mix.init(spec)
    }

    pub fn mixer_seek_to(&self, ms: u64) -> std::result::Result<(), SessionError> {
        self.mix.seek_to(ms)
    }

    pub fn get_mixed_frame(
        &self,
        buffer: &mut [i16],
        max_frames: usize,
    ) -> std::result::Result<usize, SessionError> {
        self.mix.get_frame(buffer, max_frames)
    }

    pub fn render_mix(&self, out_path: &Path) -> std::result::Result<RenderOutcome, SessionError> {
        render_to(&self.mix, out_path)
    }

    pub fn stop_mix(&self) {
        self.mix.stop();
    }

    pub fn mix_progress(&self) -> u8 {
        self.mix.progress()
    }

    // ----- standalone decoders -----

    fn slot(&self, slot: DecoderSlot) -> &Mutex<Option<TimedSourceDecoder>> {
        match slot {
            TrackKind::Bgm => &self.bgm_decoder,
            TrackKind::Music => &self.music_decoder,
        }
    }

    /// Open `path` into `slot`, replacing whatever was there.
    pub fn decoder_create(
        &self,
        path: impl AsRef<Path>,
        sample_rate: u32,
        channels: u16,
        slot: DecoderSlot,
    ) -> Result<()> {
        let decoder = TimedSourceDecoder::with_retry_limit(
            path,
            sample_rate,
            channels,
            slot,
            self.engine_config.decode_retry_limit,
        )?;
        *relock(self.slot(slot)) = Some(decoder);
        Ok(())
    }

    pub fn decoder_seek_to(&self, slot: DecoderSlot, ms: u64) -> Result<()> {
        let mut guard = relock(self.slot(slot));
        let decoder = guard.as_mut().ok_or(Error::EmptySlot(slot))?;
        decoder.seek_to(ms)?;
        Ok(())
    }

    /// Read up to `max_frames` frames from `slot`; 0 at end of stream unless
    /// `looping`.
    pub fn get_decoded_frame(
        &self,
        slot: DecoderSlot,
        buffer: &mut [i16],
        max_frames: usize,
        looping: bool,
    ) -> Result<usize> {
        let mut guard = relock(self.slot(slot));
        let decoder = guard.as_mut().ok_or(Error::EmptySlot(slot))?;
        Ok(decoder.read(buffer, max_frames, looping)?)
    }

    pub fn decoder_release(&self, slot: DecoderSlot) {
        if relock(self.slot(slot)).take().is_some() {
            debug!("Released {} decoder", slot);
        }
    }

    // ----- standalone fade -----

    #[allow(clippy::too_many_arguments)]
    pub fn fade_init(
        &self,
        sample_rate: u32,
        channels: u16,
        start_ms: u64,
        end_ms: u64,
        volume: u8,
        fade_in_ms: u64,
        fade_out_ms: u64,
    ) {
        let envelope = FadeEnvelope::new(
            sample_rate,
            channels,
            start_ms,
            end_ms,
            volume,
            fade_in_ms,
            fade_out_ms,
        )
        .with_curve(self.engine_config.default_fade_curve);
        *relock(&self.fade) = Some(envelope);
    }

    /// Apply the standalone envelope to `frame_count` frames that start at
    /// `buffer_start_ms` on the absolute timeline.
    pub fn fade(&self, buffer: &mut [i16], frame_count: usize, buffer_start_ms: u64) -> Result<()> {
        let guard = relock(&self.fade);
        let envelope = guard.as_ref().ok_or(Error::NoFadeEnvelope)?;
        envelope.apply(buffer, frame_count, buffer_start_ms);
        Ok(())
    }

    // ----- transcode -----

    /// Decode `input` into `output` (WAV or raw PCM by extension) at
    /// `sample_rate` Hz × `channels`. Blocks until done or stopped.
    pub fn decode_to_file(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> std::result::Result<RenderOutcome, SessionError> {
        self.transcoder.run(input, output, sample_rate, channels)
    }

    pub fn stop_decode(&self) {
        self.transcoder.stop();
    }

    pub fn decode_progress(&self) -> u8 {
        self.transcoder.progress()
    }

    /// Release both sessions, both decoder slots and the fade envelope.
    pub fn release(&self) {
        self.effects.release();
        self.mix.release();
        self.decoder_release(TrackKind::Bgm);
        self.decoder_release(TrackKind::Music);
        relock(&self.fade).take();
        self.transcoder.stop();
        info!("Audio engine released");
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Render an initialized session into a file chosen by extension.
pub fn render_to<P: Pipeline>(
    session: &Session<P>,
    out_path: &Path,
) -> std::result::Result<RenderOutcome, SessionError> {
    let (sample_rate, channels) = session
        .output_format()
        .ok_or(SessionError::InvalidState {
            operation: "render",
            state: session.state(),
        })?;
    if session.state() == SessionState::Stopped {
        return Err(SessionError::InvalidState {
            operation: "render",
            state: SessionState::Stopped,
        });
    }
    let mut sink = create_sink(out_path, sample_rate, channels)?;
    info!(
        "Rendering to {} ({} Hz × {} ch)",
        out_path.display(),
        sample_rate,
        channels
    );
    session.render(sink.as_mut())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slots_report_errors() {
        let engine = AudioEngine::default();
        let mut buf = [0i16; 8];
        assert!(matches!(
            engine.get_decoded_frame(TrackKind::Bgm, &mut buf, 4, false),
            Err(Error::EmptySlot(TrackKind::Bgm))
        ));
        assert!(matches!(
            engine.decoder_seek_to(TrackKind::Music, 0),
            Err(Error::EmptySlot(TrackKind::Music))
        ));
    }

    #[test]
    fn test_standalone_fade() {
        let engine = AudioEngine::default();
        let mut buf = vec![10_000i16; 4];
        assert!(matches!(engine.fade(&mut buf, 2, 0), Err(Error::NoFadeEnvelope)));

        engine.fade_init(8_000, 2, 5_000, 17_000, 80, 3_000, 3_000);
        engine.fade(&mut buf, 2, 6_500).unwrap();
        assert_eq!(buf[0], 4_000);
        assert_eq!(buf[1], 4_000);
    }

    #[test]
    fn test_render_requires_init() {
        let engine = AudioEngine::default();
        let out = std::env::temp_dir().join("voxmix-never-written.wav");
        assert!(matches!(
            engine.render_mix(&out),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let engine = AudioEngine::default();
        engine.release();
        engine.release();
        assert_eq!(engine.effects_session().state(), SessionState::Released);
        engine.stop_mix();
        assert_eq!(engine.mix_session().state(), SessionState::Released);
    }
}
