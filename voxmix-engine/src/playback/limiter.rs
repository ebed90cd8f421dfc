//! Peak limiter
//!
//! Channel-linked peak follower driving a smoothed gain. Used as the final
//! stage of the mix and as the `VolumeLimiter` voice effect.
//!
//! Signals that stay under the threshold pass through with a gain of exactly
//! 1.0, so the limiter is bit-transparent until it has work to do.

use voxmix_common::pcm::{db_to_linear, f32_to_i16, i16_to_f32};

/// Coefficient reaching ~90% of a step after `time_ms` (10–90% rise time).
/// Zero time means instant.
fn rise_time_coeff(time_ms: f32, sample_rate: u32) -> f32 {
    if time_ms <= 0.0 || sample_rate == 0 {
        return 1.0;
    }
    1.0 - (-2.2 / (sample_rate as f32 * time_ms * 0.001)).exp()
}

#[derive(Debug, Clone)]
pub struct PeakLimiter {
    channels: usize,
    threshold: f32,
    output_gain: f32,
    attack: f32,
    release: f32,
    peaks: Vec<f32>,
    gain: f32,
}

impl PeakLimiter {
    pub fn new(
        sample_rate: u32,
        channels: u16,
        threshold_db: f32,
        attack_ms: f32,
        release_ms: f32,
    ) -> Self {
        Self {
            channels: channels.max(1) as usize,
            threshold: db_to_linear(threshold_db),
            output_gain: 1.0,
            attack: rise_time_coeff(attack_ms, sample_rate),
            release: rise_time_coeff(release_ms, sample_rate),
            peaks: vec![0.0; channels.max(1) as usize],
            gain: 1.0,
        }
    }

    /// Post-limiter makeup in dB.
    pub fn with_output_gain_db(mut self, gain_db: f32) -> Self {
        self.output_gain = db_to_linear(gain_db);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Current gain reduction factor (1.0 = idle).
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.peaks.iter_mut().for_each(|p| *p = 0.0);
        self.gain = 1.0;
    }

    /// Process normalized interleaved samples in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for frame in samples.chunks_exact_mut(self.channels) {
            let mut peak = 0.0f32;
            for (ch, sample) in frame.iter().enumerate() {
                let level = sample.abs();
                let tracked = &mut self.peaks[ch];
                let coeff = if level > *tracked { self.attack } else { self.release };
                *tracked += coeff * (level - *tracked);
                peak = peak.max(*tracked);
            }

            let target = if peak <= self.threshold {
                1.0
            } else {
                self.threshold / peak
            };
            let coeff = if target < self.gain { self.attack } else { self.release };
            self.gain += coeff * (target - self.gain);

            let applied = self.gain * self.output_gain;
            if applied != 1.0 {
                for sample in frame.iter_mut() {
                    *sample *= applied;
                }
            }
        }
    }

    /// Process `i16` interleaved samples in place.
    pub fn process_i16(&mut self, samples: &mut [i16], scratch: &mut Vec<f32>) {
        scratch.clear();
        scratch.extend(samples.iter().map(|&s| i16_to_f32(s)));
        self.process(scratch);
        for (dst, &src) in samples.iter_mut().zip(scratch.iter()) {
            *dst = f32_to_i16(src);
        }
    }
}
