//! Noise suppression
//!
//! Two stages per channel group:
//! - 80 Hz high-pass removing handling noise and mains rumble
//! - downward expander keyed on a running noise-floor estimate: signal
//!   within 10 dB of the floor is attenuated (2:1, down to -20 dB)
//!
//! The floor estimate follows the envelope down quickly and climbs at most
//! 10 dB per second, so it settles on the quietest sustained level (room
//! tone between words) without chasing speech.

use super::biquad::Biquad;
use super::{parse_switch, EffectKind, VoiceEffect};
use crate::error::EffectError;
use voxmix_common::timing::time_constant_coeff;

const HPF_CUTOFF_HZ: f32 = 80.0;
const HPF_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;
/// Gate opens this far above the floor (+10 dB).
const FLOOR_MARGIN: f32 = 3.162;
const MAX_ATTENUATION: f32 = 0.1;
const INITIAL_FLOOR: f32 = 0.001;
const MIN_FLOOR: f32 = 1e-5;
const FLOOR_RISE_DB_PER_SEC: f32 = 10.0;

pub struct NoiseSuppressor {
    channels: usize,
    filters: Vec<Biquad>,
    env_attack: f32,
    env_release: f32,
    /// Per-frame multiplicative ceiling on floor growth
    floor_rise: f32,
    floor_fall: f32,
    gain_open: f32,
    gain_close: f32,
    envelope: f32,
    floor: f32,
    gain: f32,
}

impl NoiseSuppressor {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            channels,
            filters: vec![Biquad::highpass(HPF_CUTOFF_HZ, HPF_Q, sample_rate); channels],
            env_attack: time_constant_coeff(5.0, sample_rate),
            env_release: time_constant_coeff(50.0, sample_rate),
            floor_rise: 10.0_f32.powf(FLOOR_RISE_DB_PER_SEC / 20.0 / sample_rate.max(1) as f32),
            floor_fall: time_constant_coeff(50.0, sample_rate),
            gain_open: time_constant_coeff(2.0, sample_rate),
            gain_close: time_constant_coeff(80.0, sample_rate),
            envelope: 0.0,
            floor: INITIAL_FLOOR,
            gain: 1.0,
        }
    }

    /// `On` builds the suppressor, `Off` disables it.
    pub fn from_parameter(
        parameter: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Option<Self>, EffectError> {
        Ok(parse_switch(EffectKind::NoiseSuppression, parameter)?
            .then(|| Self::new(sample_rate, channels)))
    }

    /// Current noise-floor estimate (normalized peak level).
    pub fn noise_floor(&self) -> f32 {
        self.floor
    }
}

impl VoiceEffect for NoiseSuppressor {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(self.channels) {
            let mut level = 0.0f32;
            for (sample, filter) in frame.iter_mut().zip(self.filters.iter_mut()) {
                *sample = filter.process(*sample);
                level = level.max(sample.abs());
            }

            let env_coeff = if level > self.envelope { self.env_attack } else { self.env_release };
            self.envelope += env_coeff * (level - self.envelope);

            self.floor = if self.envelope > self.floor {
                (self.floor * self.floor_rise).min(self.envelope)
            } else {
                self.floor + self.floor_fall * (self.envelope - self.floor)
            }
            .max(MIN_FLOOR);

            let threshold = self.floor * FLOOR_MARGIN;
            let target = if self.envelope >= threshold {
                1.0
            } else {
                (self.envelope / threshold).max(MAX_ATTENUATION)
            };
            let gain_coeff = if target > self.gain { self.gain_open } else { self.gain_close };
            self.gain += gain_coeff * (target - self.gain);

            for sample in frame.iter_mut() {
                *sample *= self.gain;
            }
        }
    }

    fn reset(&mut self) {
        self.filters.iter_mut().for_each(Biquad::reset);
        self.envelope = 0.0;
        self.floor = INITIAL_FLOOR;
        self.gain = 1.0;
    }
}
