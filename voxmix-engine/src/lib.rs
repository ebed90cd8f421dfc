//! # voxmix engine
//!
//! Streaming PCM voice effects and timeline mixing.
//!
//! **Purpose:** Take a voice recording plus a mix document (voice effects,
//! background beds, music) and produce processed PCM through a frame-pull
//! API, or render it straight to a file.
//!
//! **Architecture:** symphonia decode → rubato resample → per-source fade
//! and sidechain ducking → 32-bit summing mixer → master limiter, driven by
//! a cancellable pull session.
//!
//! Alongside the sessions, [`audio::Transcoder`] decodes single files and
//! [`audio::pcm_tools`] measures, crops and joins PCM and WAV files.

pub mod audio;
pub mod backend;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod playback;
pub mod session;

pub use config::EngineConfig;
pub use engine::AudioEngine;
pub use error::{Error, Result};
pub use session::{RenderOutcome, Session, SessionSpec, SessionState};
