//! Volume limiter effect: a [`PeakLimiter`] with a -1 dBFS ceiling on the voice.

use super::{parse_switch, EffectKind, VoiceEffect};
use crate::error::EffectError;
use crate::playback::PeakLimiter;

const THRESHOLD_DB: f32 = -1.0;
const ATTACK_MS: f32 = 1.0;
const RELEASE_MS: f32 = 100.0;

pub struct VolumeLimiter {
    limiter: PeakLimiter,
}

impl VolumeLimiter {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            limiter: PeakLimiter::new(sample_rate, channels, THRESHOLD_DB, ATTACK_MS, RELEASE_MS),
        }
    }

    pub fn from_parameter(
        parameter: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Option<Self>, EffectError> {
        Ok(parse_switch(EffectKind::VolumeLimiter, parameter)?
            .then(|| Self::new(sample_rate, channels)))
    }
}

impl VoiceEffect for VolumeLimiter {
    fn process(&mut self, samples: &mut [f32]) {
        self.limiter.process(samples);
    }

    fn reset(&mut self) {
        self.limiter.reset();
    }
}
