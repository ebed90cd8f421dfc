//! # voxmix Common Library
//!
//! Shared code for the voxmix engine and tooling:
//! - Configuration document model (effects, background beds, music)
//! - Configuration errors
//! - Fade curve definitions
//! - Millisecond/frame arithmetic
//! - 16-bit PCM sample conversions

pub mod config;
pub mod error;
pub mod fade_curves;
pub mod pcm;
pub mod timing;

pub use config::{Config, EffectSpec, TimedAudioSource, TrackKind};
pub use error::{ConfigError, Result};
pub use fade_curves::FadeCurve;
