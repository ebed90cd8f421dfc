//! File utility tests: PCM/WAV length, crop and concat, and file-to-file
//! decode through the engine.

mod helpers;

use helpers::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use voxmix_engine::audio::pcm_tools::{concat_pcm, crop_pcm, crop_wav, pcm_duration_ms, wav_duration_ms};
use voxmix_engine::{AudioEngine, Error, RenderOutcome};

const RATE: u32 = TEST_SAMPLE_RATE;

fn read_raw(path: &std::path::Path) -> Vec<i16> {
    std::fs::read(path)
        .unwrap()
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Mono ramp where frame i holds i.
fn ramp(frames: usize) -> Vec<i16> {
    (0..frames).map(|i| i as i16).collect()
}

#[test]
fn test_pcm_duration_follows_layout() {
    let dir = TempDir::new().unwrap();
    let mono = dir.path().join("mono.pcm");
    let stereo = dir.path().join("stereo.pcm");
    generate_silent_pcm(&mono, 1_500, 1).unwrap();
    generate_silent_pcm(&stereo, 2_000, 2).unwrap();

    assert_eq!(pcm_duration_ms(&mono, RATE, 1).unwrap(), 1_500);
    assert_eq!(pcm_duration_ms(&stereo, RATE, 2).unwrap(), 2_000);
    // Same bytes read as mono last twice as long
    assert_eq!(pcm_duration_ms(&stereo, RATE, 1).unwrap(), 4_000);
}

#[test]
fn test_pcm_crop_copies_the_requested_range() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("ramp.pcm");
    let output = dir.path().join("cut.pcm");
    write_raw_pcm(&input, &ramp(8_000)).unwrap();

    let frames = crop_pcm(&input, &output, RATE, 1, 250, Some(500)).unwrap();
    assert_eq!(frames, 2_000);
    assert_eq!(read_raw(&output), (2_000..4_000).map(|i| i as i16).collect::<Vec<_>>());
}

#[test]
fn test_pcm_crop_clamps_to_file_end() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("ramp.pcm");
    let output = dir.path().join("cut.pcm");
    write_raw_pcm(&input, &ramp(8_000)).unwrap();

    assert_eq!(crop_pcm(&input, &output, RATE, 1, 900, Some(60_000)).unwrap(), 800);
    assert_eq!(read_raw(&output).first(), Some(&7_200));

    assert_eq!(crop_pcm(&input, &output, RATE, 1, 900, None).unwrap(), 800);
    assert_eq!(crop_pcm(&input, &output, RATE, 1, 5_000, None).unwrap(), 0);
    assert!(read_raw(&output).is_empty());

    assert!(matches!(
        crop_pcm(&input, &output, RATE, 1, 500, Some(100)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_concat_appends_in_order() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.pcm");
    let b = dir.path().join("b.pcm");
    let joined = dir.path().join("joined.pcm");
    write_raw_pcm(&a, &[1, 2, 3]).unwrap();
    write_raw_pcm(&b, &[-4, -5]).unwrap();

    assert_eq!(concat_pcm(&[&a, &b, &a], &joined).unwrap(), 16);
    assert_eq!(read_raw(&joined), vec![1, 2, 3, -4, -5, 1, 2, 3]);

    let empty: [&std::path::Path; 0] = [];
    assert!(matches!(concat_pcm(&empty, &joined), Err(Error::InvalidArgument(_))));
    assert!(matches!(
        concat_pcm(&[dir.path().join("missing.pcm")], &joined),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_wav_crop_keeps_format_and_range() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("steps.wav");
    let output = dir.path().join("middle.wav");
    generate_steps_wav(&input, &[(500, 100), (500, 200), (500, 300)], 2).unwrap();
    assert_eq!(wav_duration_ms(&input).unwrap(), 1_500);

    assert_eq!(crop_wav(&input, &output, 500, Some(1_000)).unwrap(), 4_000);
    assert_eq!(wav_duration_ms(&output).unwrap(), 500);

    let mut reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, RATE);
    assert!(reader.samples::<i16>().all(|s| s.unwrap() == 200));
}

#[test]
fn test_wav_crop_with_open_end_keeps_the_tail() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("steps.wav");
    let output = dir.path().join("tail.wav");
    generate_steps_wav(&input, &[(500, 100), (250, 700)], 1).unwrap();

    assert_eq!(crop_wav(&input, &output, 500, None).unwrap(), 2_000);
    let mut reader = hound::WavReader::open(&output).unwrap();
    assert!(reader.samples::<i16>().all(|s| s.unwrap() == 700));
}

#[test]
fn test_decode_to_raw_pcm_at_source_format() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("tone.wav");
    let output = dir.path().join("tone.pcm");
    generate_sine_wav(&input, 1_000, 1, 440.0, 0.5).unwrap();

    let engine = AudioEngine::default();
    let outcome = engine.decode_to_file(&input, &output, RATE, 1).unwrap();
    assert_eq!(outcome, RenderOutcome::Completed);
    assert_eq!(engine.decode_progress(), 100);

    let decoded = read_raw(&output);
    assert_eq!(decoded.len(), 8_000);
    for (frame, &sample) in decoded.iter().enumerate() {
        let expected = sine_sample(frame as u64, 440.0, 0.5);
        assert!((sample as i32 - expected as i32).abs() <= 1, "frame {}", frame);
    }
}

#[test]
fn test_decode_to_wav_resamples_and_upmixes() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("dc.wav");
    let output = dir.path().join("dc_16k.wav");
    generate_constant_wav(&input, 1_000, 1, 1_000).unwrap();

    let engine = AudioEngine::default();
    engine.decode_to_file(&input, &output, 16_000, 2).unwrap();

    let mut reader = hound::WavReader::open(&output).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.spec().channels, 2);
    let frames = reader.duration() as i64;
    assert!((frames - 16_000).abs() < 512, "got {} frames", frames);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    let middle = &samples[8_000..16_000];
    assert!(middle.chunks_exact(2).all(|f| f[0] == f[1]));
    assert!(middle.iter().all(|&s| (s as i32 - 1_000).abs() < 30));
}

#[test]
fn test_decode_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let engine = AudioEngine::default();
    let result = engine.decode_to_file(
        &dir.path().join("missing.m4a"),
        &dir.path().join("out.wav"),
        RATE,
        1,
    );
    assert!(result.is_err());
    assert_eq!(engine.decode_progress(), 0);
}

#[test]
fn test_stop_decode_leaves_a_valid_partial_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("long.wav");
    let output = dir.path().join("partial.wav");
    generate_sine_wav(&input, 300_000, 2, 200.0, 0.3).unwrap();

    let engine = Arc::new(AudioEngine::default());
    let worker = {
        let engine = Arc::clone(&engine);
        let input = input.clone();
        let output = output.clone();
        thread::spawn(move || engine.decode_to_file(&input, &output, 44_100, 2))
    };
    thread::sleep(Duration::from_millis(50));
    engine.stop_decode();

    // A stop that lands before the decode starts is superseded by it.
    match worker.join().unwrap().unwrap() {
        RenderOutcome::Stopped => {
            assert!(engine.decode_progress() < 100);
            let reader = hound::WavReader::open(&output).unwrap();
            assert!((reader.duration() as u64) < 300 * 44_100);
        }
        RenderOutcome::Completed => assert_eq!(engine.decode_progress(), 100),
    }
}
