//! Fade curve shapes for source envelopes
//!
//! A curve maps a normalized position through a fade (0.0 = fade start,
//! 1.0 = fade end) to a gain multiplier. Fade-in rises 0.0 → 1.0,
//! fade-out falls 1.0 → 0.0.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Fade curve applied to a timed source's fade-in and fade-out ramps.
///
/// - Linear: constant rate of change; the gain at a given fraction of the fade
///   is exactly that fraction of the base volume.
/// - EqualPower: `sin(t × π/2)`, holds perceived loudness when a bed fades
///   under speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    #[default]
    Linear,
    EqualPower,
}

impl FadeCurve {
    /// Fade-in multiplier at `position` (clamped to 0.0..=1.0).
    pub fn calculate_fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Fade-out multiplier at `position` (clamped to 0.0..=1.0).
    ///
    /// Mirror image of [`FadeCurve::calculate_fade_in`]: 1.0 at the start of the
    /// fade-out, 0.0 at its end.
    pub fn calculate_fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FadeCurve::Linear => f.write_str("linear"),
            FadeCurve::EqualPower => f.write_str("equal_power"),
        }
    }
}
