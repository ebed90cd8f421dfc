//! Sidechain ducking
//!
//! While the trigger (the voice) carries energy, the bed's gain is pulled
//! down toward `duck_ratio`; when the voice falls silent the bed recovers
//! to unity. Makeup gain scales with how deep the bed is currently ducked,
//! so it lifts the ducked bed without touching it when the voice is idle.
//!
//! # Time Constants
//! - **RMS window** (20 ms): trigger energy integration
//! - **Attack** (15 ms): how quickly the bed ducks when speech starts
//! - **Release** (350 ms): how quickly it swells back after speech ends
//!
//! The ducker starts at unity gain with zero trigger energy: a silent
//! trigger leaves the bed bit-identical. Its state depends on the trigger
//! alone, so [`SidechainDucker::advance`] can replay a stretch of trigger
//! without a bed and reach exactly the state `apply` would have.

use crate::config::SidechainConfig;
use voxmix_common::pcm::{db_to_linear, i16_to_f32, scale_i16};
use voxmix_common::timing::time_constant_coeff;

#[derive(Debug, Clone)]
pub struct SidechainDucker {
    trigger_channels: usize,
    bed_channels: usize,
    threshold: f32,
    duck_ratio: f32,
    makeup: f32,
    rms_coeff: f32,
    attack: f32,
    release: f32,
    /// Smoothed mean square of the trigger
    energy: f32,
    gain: f32,
}

impl SidechainDucker {
    /// `make_up_gain` is a 0–100 percentage of `params.makeup_max_db`.
    pub fn new(
        sample_rate: u32,
        trigger_channels: u16,
        bed_channels: u16,
        params: &SidechainConfig,
        make_up_gain: u8,
    ) -> Self {
        let makeup_db = params.makeup_max_db * make_up_gain.min(100) as f32 / 100.0;
        Self {
            trigger_channels: trigger_channels.max(1) as usize,
            bed_channels: bed_channels.max(1) as usize,
            threshold: params.threshold_energy,
            duck_ratio: params.duck_ratio.clamp(0.0, 1.0),
            makeup: db_to_linear(makeup_db),
            rms_coeff: time_constant_coeff(params.rms_window_ms, sample_rate),
            attack: time_constant_coeff(params.attack_ms, sample_rate),
            release: time_constant_coeff(params.release_ms, sample_rate),
            energy: 0.0,
            gain: 1.0,
        }
    }

    /// Current ducking gain before makeup (1.0 = not ducked).
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.energy = 0.0;
        self.gain = 1.0;
    }

    /// Total gain applied to the bed right now.
    fn applied_gain(&self) -> f32 {
        if self.duck_ratio >= 1.0 {
            return 1.0;
        }
        let depth = ((1.0 - self.gain) / (1.0 - self.duck_ratio)).clamp(0.0, 1.0);
        self.gain * (1.0 + (self.makeup - 1.0) * depth)
    }

    /// Update energy and gain for one interleaved trigger frame.
    fn step(&mut self, trigger_frame: &[i16]) {
        let mean_square = trigger_frame
            .iter()
            .map(|&s| {
                let v = i16_to_f32(s);
                v * v
            })
            .sum::<f32>()
            / self.trigger_channels as f32;
        self.energy += self.rms_coeff * (mean_square - self.energy);

        let target = if self.energy.sqrt() > self.threshold {
            self.duck_ratio
        } else {
            1.0
        };
        let coeff = if target < self.gain { self.attack } else { self.release };
        self.gain += coeff * (target - self.gain);
    }

    /// Consume `frame_count` trigger frames without a bed.
    pub fn advance(&mut self, trigger: &[i16], frame_count: usize) {
        for trigger_frame in trigger.chunks_exact(self.trigger_channels).take(frame_count) {
            self.step(trigger_frame);
        }
    }

    /// Duck `bed` in place against `trigger`, both interleaved, for
    /// `frame_count` frames.
    pub fn apply(&mut self, trigger: &[i16], bed: &mut [i16], frame_count: usize) {
        let frame_count = frame_count
            .min(trigger.len() / self.trigger_channels)
            .min(bed.len() / self.bed_channels);

        let triggers = trigger.chunks_exact(self.trigger_channels);
        let beds = bed.chunks_exact_mut(self.bed_channels);

        for (trigger_frame, bed_frame) in triggers.zip(beds).take(frame_count) {
            self.step(trigger_frame);
            let applied = self.applied_gain();
            for sample in bed_frame.iter_mut() {
                *sample = scale_i16(*sample, applied);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;

    fn ducker(makeup: u8) -> SidechainDucker {
        SidechainDucker::new(RATE, 2, 2, &SidechainConfig::default(), makeup)
    }

    fn tone(frames: usize, amplitude: i16) -> Vec<i16> {
        (0..frames)
            .flat_map(|i| {
                let s = ((i as f32 * 0.3).sin() * amplitude as f32) as i16;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_silent_trigger_is_exact_unity() {
        let mut ducker = ducker(100);
        let trigger = vec![0i16; 8_000 * 2];
        let original = tone(8_000, 12_000);
        let mut bed = original.clone();
        ducker.apply(&trigger, &mut bed, 8_000);
        assert_eq!(bed, original);
        assert_eq!(ducker.gain(), 1.0);
    }

    #[test]
    fn test_speech_ducks_bed() {
        let mut ducker = ducker(0);
        let trigger = tone(4_000, 10_000);
        let mut bed = vec![10_000i16; 4_000 * 2];
        ducker.apply(&trigger, &mut bed, 4_000);

        // After 500 ms of speech the bed sits near the duck ratio.
        let tail = bed[bed.len() - 2];
        let expected = (10_000.0 * SidechainConfig::default().duck_ratio) as i16;
        assert!((tail - expected).abs() < 300, "tail {} expected ~{}", tail, expected);
        // The first frames have barely moved (attack smoothing).
        assert!(bed[0] > 9_000);
    }

    #[test]
    fn test_release_recovers_toward_unity() {
        let mut ducker = ducker(0);
        let speech = tone(4_000, 10_000);
        let mut bed = vec![10_000i16; 4_000 * 2];
        ducker.apply(&speech, &mut bed, 4_000);
        let ducked = ducker.gain();

        let silence = vec![0i16; 16_000 * 2];
        let mut bed = vec![10_000i16; 16_000 * 2];
        ducker.apply(&silence, &mut bed, 16_000);
        assert!(ducker.gain() > 0.99, "gain {} after release (was {})", ducker.gain(), ducked);
    }

    #[test]
    fn test_makeup_lifts_ducked_bed_only() {
        let trigger = tone(4_000, 10_000);

        let mut plain = ducker(0);
        let mut bed_plain = vec![8_000i16; 4_000 * 2];
        plain.apply(&trigger, &mut bed_plain, 4_000);

        let mut lifted = ducker(100);
        let mut bed_lifted = vec![8_000i16; 4_000 * 2];
        lifted.apply(&trigger, &mut bed_lifted, 4_000);

        let last = bed_plain.len() - 1;
        assert!(bed_lifted[last] > bed_plain[last]);
        // Still quieter than the undisturbed bed.
        assert!(bed_lifted[last] < 8_000);
    }

    #[test]
    fn test_mono_trigger_stereo_bed() {
        let mut ducker = SidechainDucker::new(RATE, 1, 2, &SidechainConfig::default(), 0);
        let trigger: Vec<i16> = (0..4_000).map(|i| ((i as f32 * 0.3).sin() * 10_000.0) as i16).collect();
        let mut bed = vec![10_000i16; 4_000 * 2];
        ducker.apply(&trigger, &mut bed, 4_000);
        assert!(bed[bed.len() - 1] < 5_000);
        assert_eq!(bed[bed.len() - 1], bed[bed.len() - 2]);
    }

    #[test]
    fn test_advance_reaches_the_same_state_as_apply() {
        let trigger = tone(6_000, 9_000);

        let mut applied = ducker(40);
        let mut bed = vec![7_000i16; 6_000 * 2];
        applied.apply(&trigger, &mut bed, 6_000);

        let mut replayed = ducker(40);
        replayed.advance(&trigger[..2_500 * 2], 2_500);
        let mut tail = vec![7_000i16; 3_500 * 2];
        replayed.apply(&trigger[2_500 * 2..], &mut tail, 3_500);

        assert_eq!(replayed.gain(), applied.gain());
        assert_eq!(tail[..], bed[2_500 * 2..]);
    }

    #[test]
    fn test_reset_returns_to_unity() {
        let mut ducker = ducker(50);
        let trigger = tone(2_000, 10_000);
        let mut bed = vec![1_000i16; 2_000 * 2];
        ducker.apply(&trigger, &mut bed, 2_000);
        assert!(ducker.gain() < 1.0);
        ducker.reset();
        assert_eq!(ducker.gain(), 1.0);
    }
}
