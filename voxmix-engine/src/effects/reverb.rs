//! Reverb
//!
//! Freeverb topology per channel: eight damped comb filters in parallel
//! feeding four series all-pass diffusers, with an optional pre-delay.
//! Channels after the first use slightly longer delay lines so a stereo
//! voice decorrelates instead of collapsing to the center.
//!
//! | Preset | Reverberance | HF damping | Room scale | Pre-delay | Wet |
//! |---|---|---|---|---|---|
//! | default | 50 | 50 | 100 | 0 ms | -6 dB |
//! | `Room` | 30 | 60 | 50 | 0 ms | -9 dB |
//! | `Hall` | 70 | 40 | 100 | 10 ms | -6 dB |
//! | `Church` | 90 | 30 | 100 | 20 ms | -4 dB |
//!
//! Any other parameter that is not `None`/`Off` selects the default preset.

use super::{invalid, is_bypass, EffectKind, VoiceEffect};
use crate::error::EffectError;
use voxmix_common::pcm::db_to_linear;

/// Comb delay lengths in samples at 44.1 kHz
const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const ALLPASS_FEEDBACK: f32 = 0.5;
const INPUT_GAIN: f32 = 0.015;
const REFERENCE_RATE: f32 = 44_100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbPreset {
    /// 0–100
    pub reverberance: f32,
    /// 0–100
    pub hf_damping: f32,
    /// 0–100
    pub room_scale: f32,
    pub pre_delay_ms: f32,
    pub wet_gain_db: f32,
}

impl Default for ReverbPreset {
    fn default() -> Self {
        Self {
            reverberance: 50.0,
            hf_damping: 50.0,
            room_scale: 100.0,
            pre_delay_ms: 0.0,
            wet_gain_db: -6.0,
        }
    }
}

impl ReverbPreset {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "room" => Self {
                reverberance: 30.0,
                hf_damping: 60.0,
                room_scale: 50.0,
                pre_delay_ms: 0.0,
                wet_gain_db: -9.0,
            },
            "hall" => Self {
                reverberance: 70.0,
                hf_damping: 40.0,
                room_scale: 100.0,
                pre_delay_ms: 10.0,
                wet_gain_db: -6.0,
            },
            "church" => Self {
                reverberance: 90.0,
                hf_damping: 30.0,
                room_scale: 100.0,
                pre_delay_ms: 20.0,
                wet_gain_db: -4.0,
            },
            _ => Self::default(),
        }
    }
}

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;
        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = buffered - input;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel's delay network.
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    pre_delay: Vec<f32>,
    pre_pos: usize,
}

impl Tank {
    fn new(scale: f32, spread: usize, pre_delay_samples: usize) -> Self {
        let len = |base: usize| ((base + spread) as f32 * scale) as usize;
        Self {
            combs: COMB_LENGTHS.iter().map(|&l| CombFilter::new(len(l))).collect(),
            allpasses: ALLPASS_LENGTHS.iter().map(|&l| AllpassFilter::new(len(l))).collect(),
            pre_delay: vec![0.0; pre_delay_samples],
            pre_pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let input = if self.pre_delay.is_empty() {
            input
        } else {
            let delayed = self.pre_delay[self.pre_pos];
            self.pre_delay[self.pre_pos] = input;
            self.pre_pos = (self.pre_pos + 1) % self.pre_delay.len();
            delayed
        };

        let fed = input * INPUT_GAIN;
        let mut out = self
            .combs
            .iter_mut()
            .map(|comb| comb.process(fed, feedback, damp))
            .sum::<f32>();
        for allpass in self.allpasses.iter_mut() {
            out = allpass.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.allpasses.iter_mut().for_each(AllpassFilter::reset);
        self.pre_delay.fill(0.0);
        self.pre_pos = 0;
    }
}

pub struct Reverb {
    channels: usize,
    tanks: Vec<Tank>,
    feedback: f32,
    damp: f32,
    wet: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, channels: u16, preset: ReverbPreset) -> Self {
        let channels = channels.max(1) as usize;
        let room = preset.room_scale.clamp(0.0, 100.0) / 100.0;
        let scale = sample_rate as f32 / REFERENCE_RATE * (0.5 + 0.5 * room);
        let pre_delay_samples = (preset.pre_delay_ms.max(0.0) * sample_rate as f32 / 1000.0) as usize;

        Self {
            channels,
            tanks: (0..channels)
                .map(|ch| Tank::new(scale, ch * STEREO_SPREAD, pre_delay_samples))
                .collect(),
            feedback: 0.7 + 0.28 * preset.reverberance.clamp(0.0, 100.0) / 100.0,
            damp: 0.4 * preset.hf_damping.clamp(0.0, 100.0) / 100.0,
            wet: db_to_linear(preset.wet_gain_db),
        }
    }

    pub fn from_parameter(
        parameter: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Option<Self>, EffectError> {
        if parameter.trim().is_empty() {
            return Err(invalid(EffectKind::Reverb, parameter));
        }
        if is_bypass(parameter) {
            return Ok(None);
        }
        Ok(Some(Self::new(
            sample_rate,
            channels,
            ReverbPreset::from_name(parameter),
        )))
    }
}

impl VoiceEffect for Reverb {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(self.channels) {
            for (sample, tank) in frame.iter_mut().zip(self.tanks.iter_mut()) {
                let wet = tank.process(*sample, self.feedback, self.damp);
                *sample += wet * self.wet;
            }
        }
    }

    fn reset(&mut self) {
        self.tanks.iter_mut().for_each(Tank::reset);
    }
}
