//! Pull sessions
//!
//! A [`Session`] wraps one [`Pipeline`] behind the frame-pull lifecycle:
//!
//! ```text
//! Uninitialized ──init──▶ Ready ──get_frame──▶ Streaming
//!       ▲                  │  ▲                    │
//!       │                  │  └──────init──────────┤
//!       │                  ▼                       ▼
//!       └───────────── (any) ──stop──▶ Stopped ──release──▶ Released
//! ```
//!
//! # Concurrency
//!
//! State, the cancel flag and progress are atomics in a shared
//! [`SessionControl`]; `stop`, `progress` and `state` never touch the
//! pipeline lock. `get_frame` and `seek_to` are single-writer: callers must
//! not issue them concurrently on one session. The mutex only prevents torn
//! pipeline state.
//!
//! `get_frame` works in units of `chunk_frames` and checks the cancel flag
//! between units, so a `stop` from another thread is observed within one
//! unit of work. The same flag is polled by decoders while they skip during
//! a seek, and by `init` before it publishes `Ready`.

pub mod pipeline;

pub use pipeline::{EffectsPipeline, MixPipeline, Pipeline};

use crate::audio::{PcmSink, StopFlag, VoiceInput};
use crate::config::EngineConfig;
use crate::error::SessionError;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use voxmix_common::timing::ms_to_frames;
use voxmix_common::{Config, ConfigError};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Ready = 1,
    Streaming = 2,
    Stopped = 3,
    Released = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Ready,
            2 => SessionState::Streaming,
            3 => SessionState::Stopped,
            4 => SessionState::Released,
            _ => SessionState::Uninitialized,
        }
    }

    fn is_active(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Ready => "Ready",
            SessionState::Streaming => "Streaming",
            SessionState::Stopped => "Stopped",
            SessionState::Released => "Released",
        };
        f.write_str(name)
    }
}

/// Lock-free control block shared between the pulling thread and observers.
#[derive(Debug)]
pub struct SessionControl {
    state: AtomicU8,
    cancel: StopFlag,
    progress: AtomicU8,
}

impl SessionControl {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Uninitialized as u8),
            cancel: StopFlag::new(),
            progress: AtomicU8::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_raised()
    }

    /// Move to `Ready` from whatever state the session is in, unless a stop
    /// has been requested.
    fn publish_ready(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if self.cancelled() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                SessionState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Percent complete, 0–100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    fn advance_progress(&self, percent: u8) {
        self.progress.fetch_max(percent.min(100), Ordering::AcqRel);
    }

    /// Request the session stop. Safe from any thread at any time; a no-op
    /// once released.
    pub fn stop(&self) {
        self.cancel.raise();
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == SessionState::Released as u8 || current == SessionState::Stopped as u8 {
                return;
            }
            match self.state.compare_exchange_weak(
                current,
                SessionState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Cloneable handle for observing or stopping a session from another thread.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<SessionControl>);

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.0.state()
    }

    pub fn progress(&self) -> u8 {
        self.0.progress()
    }

    pub fn stop(&self) {
        self.0.stop()
    }
}

/// What a session renders: the voice recording and the mix document.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub voice: VoiceInput,
    pub config: Config,
}

impl SessionSpec {
    pub fn new(voice: VoiceInput, config: Config) -> Self {
        Self { voice, config }
    }

    /// Parse the mix document from JSON text.
    pub fn from_json(voice: VoiceInput, document: &str) -> Result<Self, SessionError> {
        let config = Config::parse(document).map_err(config_error)?;
        Ok(Self::new(voice, config))
    }

    /// Load the mix document from a file.
    pub fn from_config_path(voice: VoiceInput, path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let config = Config::from_path(path).map_err(config_error)?;
        Ok(Self::new(voice, config))
    }
}

/// Unreadable files are I/O failures; everything else about the document is
/// a configuration problem.
fn config_error(err: ConfigError) -> SessionError {
    match err {
        ConfigError::Io { path, source } => SessionError::IoFailure { path, source },
        other => SessionError::BadConfig(other),
    }
}

/// How a render ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    Stopped,
}

/// Frame-pull session over one pipeline.
pub struct Session<P: Pipeline> {
    control: Arc<SessionControl>,
    pipeline: Mutex<Option<P>>,
    engine: EngineConfig,
}

pub type EffectsSession = Session<EffectsPipeline>;
pub type MixSession = Session<MixPipeline>;

impl<P: Pipeline> Session<P> {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            control: Arc::new(SessionControl::new()),
            pipeline: Mutex::new(None),
            engine,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle(Arc::clone(&self.control))
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    pub fn progress(&self) -> u8 {
        self.control.progress()
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    /// Output `(sample_rate, channels)` while a pipeline is loaded.
    pub fn output_format(&self) -> Option<(u32, u16)> {
        self.lock()
            .as_ref()
            .map(|p| (p.sample_rate(), p.channels()))
    }

    /// Recover the guard from a poisoned lock; pipeline state is replaced on
    /// the next `init` anyway.
    fn lock(&self) -> MutexGuard<'_, Option<P>> {
        self.pipeline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state(),
        }
    }

    /// Build a pipeline for `spec` and make the session `Ready`.
    ///
    /// An active pipeline is torn down first. On failure the session keeps
    /// its previous state.
    ///
    /// # Errors
    /// - [`SessionError::Cancelled`] if `stop` or `release` landed while the
    ///   pipeline was being built; the session stays where the stop put it
    pub fn init(&self, spec: &SessionSpec) -> Result<(), SessionError> {
        info!("Initializing {} session: {}", P::KIND, spec.config.summary());
        // Only a stop issued after this point cancels the init.
        self.control.cancel.clear();
        let pipeline = match P::build(spec, &self.engine, &self.control.cancel) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("{} session init failed: {}", P::KIND, e);
                return Err(e);
            }
        };

        let mut guard = self.lock();
        if self.control.cancelled() {
            warn!("{} session init cancelled by stop", P::KIND);
            return Err(SessionError::Cancelled);
        }
        if guard.take().is_some() {
            debug!("Tore down previous {} pipeline", P::KIND);
        }
        *guard = Some(pipeline);
        self.control.progress.store(0, Ordering::Release);
        if !self.control.publish_ready() {
            warn!("{} session init cancelled by stop", P::KIND);
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    /// Reposition the output cursor. Clamped to the voice duration when known.
    pub fn seek_to(&self, ms: u64) -> Result<(), SessionError> {
        if !self.state().is_active() {
            return Err(self.invalid("seek_to"));
        }
        let mut guard = self.lock();
        let pipeline = guard.as_mut().ok_or_else(|| self.invalid("seek_to"))?;

        let mut frame = ms_to_frames(ms, pipeline.sample_rate());
        if let Some(duration) = pipeline.duration_frames() {
            frame = frame.min(duration);
        }
        debug!("{} session seek to {} ms (frame {})", P::KIND, ms, frame);
        pipeline.seek_to_frame(frame)?;
        self.update_progress(pipeline);
        Ok(())
    }

    /// Pull up to `max_frames` interleaved frames into `out`.
    ///
    /// Returns `Ok(0)` at end of stream, and only then.
    ///
    /// # Errors
    /// - [`SessionError::InvalidArgument`] if `max_frames` is zero or `out`
    ///   cannot hold one whole frame
    /// - [`SessionError::InvalidState`] unless `Ready` or `Streaming`
    /// - [`SessionError::Cancelled`] if `stop` landed during the call; no
    ///   frames are delivered in that case
    /// - [`SessionError::Decode`] if the voice cannot be decoded
    pub fn get_frame(&self, out: &mut [i16], max_frames: usize) -> Result<usize, SessionError> {
        if !self.state().is_active() {
            return Err(self.invalid("get_frame"));
        }
        let mut guard = self.lock();
        let pipeline = guard.as_mut().ok_or_else(|| self.invalid("get_frame"))?;

        let channels = pipeline.channels() as usize;
        let max_frames = max_frames.min(out.len() / channels);
        if max_frames == 0 {
            return Err(SessionError::InvalidArgument(format!(
                "need room for at least one {}-channel frame, got {} samples",
                channels,
                out.len()
            )));
        }
        let chunk = self.engine.chunk_frames.max(1);

        let mut filled = 0;
        while filled < max_frames {
            if self.control.cancelled() {
                return Err(SessionError::Cancelled);
            }
            let want = (max_frames - filled).min(chunk);
            let n = pipeline.pull(&mut out[filled * channels..(filled + want) * channels], want)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if self.control.cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.control
            .transition(SessionState::Ready, SessionState::Streaming);
        if self.state() != SessionState::Streaming {
            return Err(SessionError::Cancelled);
        }

        if filled == 0 {
            self.control.advance_progress(100);
        } else {
            self.update_progress(pipeline);
        }
        Ok(filled)
    }

    fn update_progress(&self, pipeline: &P) {
        if let Some(duration) = pipeline.duration_frames().filter(|&d| d > 0) {
            let percent = (pipeline.position_frames().min(duration) * 100 / duration) as u8;
            self.control.advance_progress(percent);
        }
    }

    /// Stop the session. Lock-free; safe from any thread.
    pub fn stop(&self) {
        let before = self.state();
        self.control.stop();
        if before != SessionState::Released && before != SessionState::Stopped {
            info!("{} session stopped at {}%", P::KIND, self.progress());
        }
    }

    /// Free the pipeline. Only `init` is valid afterwards.
    pub fn release(&self) {
        self.control.cancel.raise();
        self.control.set_state(SessionState::Released);
        if self.lock().take().is_some() {
            debug!("{} session released", P::KIND);
        }
    }

    /// Pull to end of stream into `sink`.
    ///
    /// A `stop` during the render finishes the sink with what was written
    /// and reports [`RenderOutcome::Stopped`].
    pub fn render(&self, sink: &mut dyn PcmSink) -> Result<RenderOutcome, SessionError> {
        let (_, channels) = self
            .output_format()
            .ok_or_else(|| self.invalid("render"))?;
        let chunk = self.engine.chunk_frames.max(1);
        let mut buffer = vec![0i16; chunk * channels as usize];
        let mut written: u64 = 0;

        loop {
            match self.get_frame(&mut buffer, chunk) {
                Ok(0) => break,
                Ok(n) => {
                    sink.write(&buffer[..n * channels as usize])?;
                    written += n as u64;
                }
                Err(SessionError::Cancelled)
                | Err(SessionError::InvalidState {
                    state: SessionState::Stopped,
                    ..
                }) => {
                    sink.finish()?;
                    warn!("{} render stopped after {} frames", P::KIND, written);
                    return Ok(RenderOutcome::Stopped);
                }
                Err(e) => return Err(e),
            }
        }

        sink.finish()?;
        info!("{} render complete: {} frames", P::KIND, written);
        Ok(RenderOutcome::Completed)
    }
}

impl<P: Pipeline> Drop for Session<P> {
    fn drop(&mut self) {
        if self.state() != SessionState::Released {
            self.release();
        }
    }
}
