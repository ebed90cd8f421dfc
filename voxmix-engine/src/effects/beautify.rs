//! Voice beautification
//!
//! A low-end presence boost (peaking EQ, 89.5 Hz, Q 1.5, +5.8 dB) followed
//! by a slow voice compander that lifts quiet passages and evens out level.
//! The compander maps -70 dB to -60 dB and -20 dB to -20 dB, linear in
//! between, slope 1 outside that range.
//!
//! Attack 300 ms, decay 1 s, -5 dB output gain, envelope primed at -90 dB.
//! Every named preset (`CleanVoice`, `Bass`, `Magnetic`, ...) maps to this
//! voicing; `None`/`Off` disable it.

use super::biquad::Biquad;
use super::{invalid, is_bypass, EffectKind, VoiceEffect};
use crate::error::EffectError;
use voxmix_common::pcm::db_to_linear;
use voxmix_common::timing::time_constant_coeff;

const EQ_CENTER_HZ: f32 = 89.5;
const EQ_Q: f32 = 1.5;
const EQ_GAIN_DB: f32 = 5.8;

const ATTACK_MS: f32 = 300.0;
const DECAY_MS: f32 = 1_000.0;
const OUTPUT_GAIN_DB: f32 = -5.0;
const INITIAL_LEVEL_DB: f32 = -90.0;
/// Transfer curve break points `(in_db, out_db)`; slope 1 outside them.
const TRANSFER: [(f32, f32); 3] = [(-70.0, -60.0), (-20.0, -20.0), (0.0, 0.0)];

/// Map an input level to the compander's output level, both in dB.
fn transfer_db(in_db: f32) -> f32 {
    let (first_in, first_out) = TRANSFER[0];
    if in_db <= first_in {
        return in_db + (first_out - first_in);
    }
    for pair in TRANSFER.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if in_db <= x1 {
            return y0 + (in_db - x0) * (y1 - y0) / (x1 - x0);
        }
    }
    in_db
}

pub struct Beautifier {
    channels: usize,
    eq: Vec<Biquad>,
    attack: f32,
    decay: f32,
    output_gain: f32,
    envelope: f32,
}

impl Beautifier {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            channels,
            eq: vec![Biquad::peaking(EQ_CENTER_HZ, EQ_Q, EQ_GAIN_DB, sample_rate); channels],
            attack: time_constant_coeff(ATTACK_MS, sample_rate),
            decay: time_constant_coeff(DECAY_MS, sample_rate),
            output_gain: db_to_linear(OUTPUT_GAIN_DB),
            envelope: db_to_linear(INITIAL_LEVEL_DB),
        }
    }

    pub fn from_parameter(
        parameter: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Option<Self>, EffectError> {
        if parameter.trim().is_empty() {
            return Err(invalid(EffectKind::Beautify, parameter));
        }
        if is_bypass(parameter) {
            return Ok(None);
        }
        Ok(Some(Self::new(sample_rate, channels)))
    }

    fn compander_gain(&self) -> f32 {
        let in_db = 20.0 * self.envelope.max(1e-9).log10();
        db_to_linear(transfer_db(in_db) - in_db) * self.output_gain
    }
}

impl VoiceEffect for Beautifier {
    fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(self.channels) {
            let mut level = 0.0f32;
            for (sample, eq) in frame.iter_mut().zip(self.eq.iter_mut()) {
                *sample = eq.process(*sample);
                level = level.max(sample.abs());
            }

            let coeff = if level > self.envelope { self.attack } else { self.decay };
            self.envelope += coeff * (level - self.envelope);

            let gain = self.compander_gain();
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }

    fn reset(&mut self) {
        self.eq.iter_mut().for_each(Biquad::reset);
        self.envelope = db_to_linear(INITIAL_LEVEL_DB);
    }
}
