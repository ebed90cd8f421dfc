//! 16-bit PCM sample helpers
//!
//! All engine I/O is interleaved signed 16-bit little-endian PCM. Internal
//! processing runs in `f32` normalized to [-1.0, 1.0); these helpers are the
//! conversion points and always saturate instead of wrapping.

/// Scale between `i16` and normalized `f32`.
pub const I16_SCALE: f32 = 32768.0;

#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

/// Convert a normalized sample back to `i16`, rounding and saturating.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = (sample * I16_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Multiply an `i16` sample by a gain, rounding and saturating.
///
/// A gain of exactly 1.0 returns the input unchanged.
#[inline]
pub fn scale_i16(sample: i16, gain: f32) -> i16 {
    let scaled = (sample as f32 * gain).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Saturate a 32-bit accumulator to the `i16` range.
#[inline]
pub fn clamp_i32(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Convert a decibel value to a linear amplitude factor.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Remix interleaved `i16` audio between channel layouts.
///
/// - same layout: copied
/// - N → mono: average of all channels
/// - mono → N: duplicated to every channel
/// - N → M otherwise: channel `c` takes source channel `c % N`
pub fn remix_channels(input: &[i16], from: u16, to: u16, output: &mut Vec<i16>) {
    let from = from.max(1) as usize;
    let to = to.max(1) as usize;
    let frames = input.len() / from;
    output.reserve(frames * to);

    if from == to {
        output.extend_from_slice(&input[..frames * from]);
        return;
    }

    for frame in input.chunks_exact(from) {
        if to == 1 {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            output.push(clamp_i32(sum / from as i32));
        } else {
            for c in 0..to {
                output.push(frame[c % from]);
            }
        }
    }
}
