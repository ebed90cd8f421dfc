//! Voice effect chain
//!
//! Effects are looked up by name (case-insensitive) and always run in a fixed
//! order regardless of their order in the configuration:
//!
//! 1. NoiseSuppression: rumble high-pass plus a noise-floor expander
//! 2. Beautify: low-end presence EQ plus a voice compander
//! 3. Reverb: Freeverb-style room
//! 4. VolumeLimiter: peak limiter
//!
//! A chain with nothing enabled leaves samples bit-identical.

pub mod beautify;
pub mod biquad;
pub mod noise_suppression;
pub mod reverb;
pub mod volume_limiter;

use crate::error::EffectError;
use tracing::{debug, info, warn};
use voxmix_common::pcm::{f32_to_i16, i16_to_f32};
use voxmix_common::EffectSpec;

/// A stateful processor over normalized interleaved samples.
pub trait VoiceEffect: Send {
    fn process(&mut self, samples: &mut [f32]);

    /// Drop all history (delay lines, envelopes, filter state).
    fn reset(&mut self);
}

/// Known effects, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    NoiseSuppression,
    Beautify,
    Reverb,
    VolumeLimiter,
}

impl EffectKind {
    pub const ALL: [EffectKind; 4] = [
        EffectKind::NoiseSuppression,
        EffectKind::Beautify,
        EffectKind::Reverb,
        EffectKind::VolumeLimiter,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::NoiseSuppression => "NoiseSuppression",
            EffectKind::Beautify => "Beautify",
            EffectKind::Reverb => "Reverb",
            EffectKind::VolumeLimiter => "VolumeLimiter",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Instantiate for `parameter`. `Ok(None)` means the parameter switches
    /// the effect off.
    fn build(
        self,
        parameter: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Option<Box<dyn VoiceEffect>>, EffectError> {
        let effect: Option<Box<dyn VoiceEffect>> = match self {
            EffectKind::NoiseSuppression => {
                noise_suppression::NoiseSuppressor::from_parameter(parameter, sample_rate, channels)?
                    .map(|e| Box::new(e) as Box<dyn VoiceEffect>)
            }
            EffectKind::Beautify => beautify::Beautifier::from_parameter(parameter, sample_rate, channels)?
                .map(|e| Box::new(e) as Box<dyn VoiceEffect>),
            EffectKind::Reverb => reverb::Reverb::from_parameter(parameter, sample_rate, channels)?
                .map(|e| Box::new(e) as Box<dyn VoiceEffect>),
            EffectKind::VolumeLimiter => {
                volume_limiter::VolumeLimiter::from_parameter(parameter, sample_rate, channels)?
                    .map(|e| Box::new(e) as Box<dyn VoiceEffect>)
            }
        };
        Ok(effect)
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an `On`/`Off` switch parameter.
pub(crate) fn parse_switch(kind: EffectKind, parameter: &str) -> Result<bool, EffectError> {
    match parameter.trim() {
        p if p.eq_ignore_ascii_case("on") => Ok(true),
        p if p.eq_ignore_ascii_case("off") => Ok(false),
        _ => Err(invalid(kind, parameter)),
    }
}

/// `None`/`Off` disable preset-style effects.
pub(crate) fn is_bypass(parameter: &str) -> bool {
    let p = parameter.trim();
    p.eq_ignore_ascii_case("none") || p.eq_ignore_ascii_case("off")
}

pub(crate) fn invalid(kind: EffectKind, parameter: &str) -> EffectError {
    EffectError::InvalidParameter {
        effect: kind.name().to_string(),
        parameter: parameter.to_string(),
    }
}

struct Slot {
    parameter: String,
    effect: Option<Box<dyn VoiceEffect>>,
}

/// Ordered voice effects for one session.
pub struct EffectChain {
    sample_rate: u32,
    channels: u16,
    slots: [Option<Slot>; 4],
    scratch: Vec<f32>,
}

impl EffectChain {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            slots: [None, None, None, None],
            scratch: Vec::new(),
        }
    }

    /// Apply a resolved effect list.
    ///
    /// Effects whose parameter did not change keep their instance and state.
    /// Effects missing from `specs` are removed. Unknown names and invalid
    /// parameters are logged, skipped, and returned.
    pub fn configure(&mut self, specs: &[EffectSpec]) -> Vec<EffectError> {
        let mut errors = Vec::new();
        let mut wanted: [Option<&str>; 4] = [None; 4];

        for spec in specs {
            match EffectKind::from_name(&spec.name) {
                Some(kind) => wanted[kind.index()] = Some(spec.parameter.as_str()),
                None => {
                    warn!("Skipping unknown effect '{}'", spec.name);
                    errors.push(EffectError::UnknownEffect(spec.name.clone()));
                }
            }
        }

        for kind in EffectKind::ALL {
            let slot = &mut self.slots[kind.index()];
            let Some(parameter) = wanted[kind.index()] else {
                if slot.take().is_some() {
                    debug!("Removed effect {}", kind);
                }
                continue;
            };

            if let Some(existing) = slot.as_ref() {
                if existing.parameter.eq_ignore_ascii_case(parameter.trim()) {
                    continue;
                }
            }

            match kind.build(parameter, self.sample_rate, self.channels) {
                Ok(effect) => {
                    info!(
                        "Effect {} = {} ({})",
                        kind,
                        parameter,
                        if effect.is_some() { "active" } else { "bypassed" }
                    );
                    *slot = Some(Slot {
                        parameter: parameter.trim().to_string(),
                        effect,
                    });
                }
                Err(e) => {
                    warn!("Skipping effect: {}", e);
                    *slot = None;
                    errors.push(e);
                }
            }
        }

        errors
    }

    /// Effects that will touch samples, in processing order.
    pub fn active_effects(&self) -> Vec<EffectKind> {
        EffectKind::ALL
            .iter()
            .copied()
            .filter(|kind| {
                self.slots[kind.index()]
                    .as_ref()
                    .is_some_and(|slot| slot.effect.is_some())
            })
            .collect()
    }

    pub fn is_bypassed(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.as_ref().map_or(true, |s| s.effect.is_none()))
    }

    /// Process interleaved samples in place.
    pub fn apply(&mut self, samples: &mut [i16]) {
        if self.is_bypassed() {
            return;
        }

        self.scratch.clear();
        self.scratch.extend(samples.iter().map(|&s| i16_to_f32(s)));
        for slot in self.slots.iter_mut().flatten() {
            if let Some(effect) = slot.effect.as_mut() {
                effect.process(&mut self.scratch);
            }
        }
        for (dst, &src) in samples.iter_mut().zip(self.scratch.iter()) {
            *dst = f32_to_i16(src);
        }
    }

    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            if let Some(effect) = slot.effect.as_mut() {
                effect.reset();
            }
        }
    }
}
