//! Engine tuning configuration
//!
//! The mix document (see [`voxmix_common::Config`]) says *what* to render.
//! This file says *how*: work-unit size, output layout, ducker time
//! constants, limiter ceiling. Everything has a built-in default, so an
//! empty TOML file (or no file at all) is a valid configuration.
//!
//! ```toml
//! chunk_frames = 1024
//! mix_channels = 2
//!
//! [sidechain]
//! attack_ms = 15.0
//! release_ms = 350.0
//! ```
//!
//! # Settings Sources Priority
//!
//! 1. `--engine-config` command-line argument
//! 2. `VOXMIX_ENGINE_CONFIG` environment variable
//! 3. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use voxmix_common::FadeCurve;

/// Engine tuning loaded from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Frames per work unit. `stop()` is observed between work units.
    pub chunk_frames: usize,

    /// Output channel count of the mix session.
    pub mix_channels: u16,

    /// Consecutive decode/I-O failures tolerated per source before giving up.
    pub decode_retry_limit: u32,

    /// Run a peak limiter over the final mix.
    pub master_limiter: bool,

    /// Master limiter ceiling in dBFS.
    pub master_limiter_threshold_db: f32,

    /// Curve used when a source does not name one.
    pub default_fade_curve: FadeCurve,

    pub sidechain: SidechainConfig,
}

/// Sidechain ducking time constants and depth.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SidechainConfig {
    /// Trigger RMS (normalized full scale) above which the bed ducks.
    pub threshold_energy: f32,

    /// Bed gain while fully ducked, 0.0–1.0.
    pub duck_ratio: f32,

    pub attack_ms: f32,
    pub release_ms: f32,

    /// RMS integration window for the trigger.
    pub rms_window_ms: f32,

    /// Makeup gain at `makeUpGain = 100`.
    pub makeup_max_db: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            mix_channels: 2,
            decode_retry_limit: 3,
            master_limiter: true,
            master_limiter_threshold_db: -0.5,
            default_fade_curve: FadeCurve::Linear,
            sidechain: SidechainConfig::default(),
        }
    }
}

impl Default for SidechainConfig {
    fn default() -> Self {
        Self {
            threshold_energy: 0.01,
            duck_ratio: 0.25,
            attack_ms: 15.0,
            release_ms: 350.0,
            rms_window_ms: 20.0,
            makeup_max_db: 6.0,
        }
    }
}

impl EngineConfig {
    /// Parse TOML text and validate ranges.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| Error::EngineConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve from an optional path, falling back to defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_frames == 0 {
            return Err(Error::EngineConfig("chunk_frames must be positive".into()));
        }
        if !(1..=8).contains(&self.mix_channels) {
            return Err(Error::EngineConfig(format!(
                "mix_channels must be within 1..=8, got {}",
                self.mix_channels
            )));
        }
        if self.master_limiter_threshold_db > 0.0 {
            return Err(Error::EngineConfig(
                "master_limiter_threshold_db must not exceed 0 dBFS".into(),
            ));
        }
        let sc = &self.sidechain;
        if !(0.0..=1.0).contains(&sc.duck_ratio) {
            return Err(Error::EngineConfig(format!(
                "sidechain.duck_ratio must be within 0..=1, got {}",
                sc.duck_ratio
            )));
        }
        if sc.threshold_energy < 0.0
            || sc.attack_ms < 0.0
            || sc.release_ms < 0.0
            || sc.rms_window_ms < 0.0
            || sc.makeup_max_db < 0.0
        {
            return Err(Error::EngineConfig(
                "sidechain values must not be negative".into(),
            ));
        }
        Ok(())
    }
}
