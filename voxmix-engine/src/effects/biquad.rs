//! Second-order IIR section (RBJ cookbook coefficients)

use std::f32::consts::PI;

#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::identity()
    }
}

impl Biquad {
    /// Pass-through section.
    pub fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn highpass(cutoff: f32, q: f32, sample_rate: u32) -> Self {
        let (cw0, alpha) = Self::prewarp(cutoff, q, sample_rate);
        let inv_a0 = 1.0 / (1.0 + alpha);
        Self {
            b0: (1.0 + cw0) * 0.5 * inv_a0,
            b1: -(1.0 + cw0) * inv_a0,
            b2: (1.0 + cw0) * 0.5 * inv_a0,
            a1: -2.0 * cw0 * inv_a0,
            a2: (1.0 - alpha) * inv_a0,
            ..Self::identity()
        }
    }

    pub fn lowpass(cutoff: f32, q: f32, sample_rate: u32) -> Self {
        let (cw0, alpha) = Self::prewarp(cutoff, q, sample_rate);
        let inv_a0 = 1.0 / (1.0 + alpha);
        Self {
            b0: (1.0 - cw0) * 0.5 * inv_a0,
            b1: (1.0 - cw0) * inv_a0,
            b2: (1.0 - cw0) * 0.5 * inv_a0,
            a1: -2.0 * cw0 * inv_a0,
            a2: (1.0 - alpha) * inv_a0,
            ..Self::identity()
        }
    }

    /// Peaking EQ; flat gains collapse to the identity section.
    pub fn peaking(center: f32, q: f32, gain_db: f32, sample_rate: u32) -> Self {
        if gain_db.abs() < 0.01 {
            return Self::identity();
        }
        let a = 10.0_f32.powf(gain_db / 40.0);
        let (cw0, alpha) = Self::prewarp(center, q, sample_rate);
        let inv_a0 = 1.0 / (1.0 + alpha / a);
        Self {
            b0: (1.0 + alpha * a) * inv_a0,
            b1: -2.0 * cw0 * inv_a0,
            b2: (1.0 - alpha * a) * inv_a0,
            a1: -2.0 * cw0 * inv_a0,
            a2: (1.0 - alpha / a) * inv_a0,
            ..Self::identity()
        }
    }

    fn prewarp(freq: f32, q: f32, sample_rate: u32) -> (f32, f32) {
        let nyquist = sample_rate as f32 * 0.5;
        let freq = freq.clamp(1.0, nyquist * 0.99);
        let w0 = 2.0 * PI * freq / sample_rate as f32;
        (w0.cos(), w0.sin() / (2.0 * q.max(1e-6)))
    }

    /// Transposed direct form II.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * out + self.z2;
        self.z2 = self.b2 * input - self.a2 * out;
        out
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms_after(filter: &mut Biquad, freq: f32, rate: u32) -> f32 {
        let n = rate as usize;
        let mut acc = 0.0;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f32 / rate as f32).sin();
            let y = filter.process(x);
            if i >= n / 2 {
                acc += y * y;
            }
        }
        (acc / (n / 2) as f32).sqrt()
    }

    #[test]
    fn test_identity_passes_through() {
        let mut f = Biquad::identity();
        for x in [0.5, -0.25, 1.0] {
            assert_eq!(f.process(x), x);
        }
    }

    #[test]
    fn test_highpass_blocks_rumble() {
        let low = rms_after(&mut Biquad::highpass(80.0, 0.707, 16_000), 20.0, 16_000);
        let high = rms_after(&mut Biquad::highpass(80.0, 0.707, 16_000), 1_000.0, 16_000);
        assert!(low < 0.1, "20 Hz rms {}", low);
        assert!(high > 0.65, "1 kHz rms {}", high);
    }

    #[test]
    fn test_peaking_boosts_center() {
        let boosted = rms_after(&mut Biquad::peaking(1_000.0, 1.5, 6.0, 16_000), 1_000.0, 16_000);
        // +6 dB on a 0.707 rms sine
        assert!((boosted - 1.41).abs() < 0.05, "rms {}", boosted);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut a = Biquad::lowpass(500.0, 0.707, 8_000);
        let mut b = a;
        for i in 0..100 {
            a.process((i as f32).sin());
        }
        a.reset();
        assert_eq!(a.process(0.3), b.process(0.3));
    }
}
