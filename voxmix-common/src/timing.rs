//! Millisecond ↔ frame conversions
//!
//! Every position in the engine is an absolute frame index at the session's
//! output sample rate. Configuration documents and the pull API speak
//! milliseconds; these helpers are the single place where the two meet.
//!
//! A *frame* is one sample per channel. At 44.1 kHz stereo, one frame is two
//! `i16` values and 1000 ms is 44 100 frames.
//!
//! Conversions round down (frame → ms) and up (ms → frame), so
//! `frames_to_ms(ms_to_frames(ms, r), r) == ms` for every sample rate of at
//! least 1 kHz.

/// Convert milliseconds to a frame count at `sample_rate`.
///
/// # Examples
/// ```
/// use voxmix_common::timing::ms_to_frames;
/// assert_eq!(ms_to_frames(1000, 44_100), 44_100);
/// assert_eq!(ms_to_frames(5000, 8_000), 40_000);
/// ```
pub fn ms_to_frames(ms: u64, sample_rate: u32) -> u64 {
    let rate = sample_rate as u128;
    ((ms as u128 * rate + 999) / 1000) as u64
}

/// Convert a frame count at `sample_rate` to whole milliseconds (truncating).
pub fn frames_to_ms(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    ((frames as u128 * 1000) / sample_rate as u128) as u64
}

/// Convert a count of frames from one sample rate to another (nearest frame).
pub fn rescale_frames(frames: u64, from_rate: u32, to_rate: u32) -> u64 {
    if from_rate == to_rate || from_rate == 0 {
        return frames;
    }
    ((frames as u128 * to_rate as u128 + from_rate as u128 / 2) / from_rate as u128) as u64
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
///
/// Used with the update form `state += coeff * (target - state)`; a time
/// constant of zero yields 1.0 (instant).
pub fn time_constant_coeff(time_ms: f32, sample_rate: u32) -> f32 {
    if time_ms <= 0.0 || sample_rate == 0 {
        return 1.0;
    }
    let samples = time_ms * 0.001 * sample_rate as f32;
    1.0 - (-1.0 / samples).exp()
}
