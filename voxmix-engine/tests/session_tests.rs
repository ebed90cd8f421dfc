//! Session lifecycle tests: state transitions, seek clamping, cancellation
//! and progress reporting.

mod helpers;

use helpers::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use voxmix_engine::audio::VoiceInput;
use voxmix_engine::error::SessionError;
use voxmix_engine::session::{EffectsSession, MixSession};
use voxmix_engine::{AudioEngine, EngineConfig, RenderOutcome, Session, SessionSpec, SessionState};

const RATE: u32 = TEST_SAMPLE_RATE;

fn effects_spec(voice: &std::path::Path) -> SessionSpec {
    SessionSpec::from_json(VoiceInput::new(voice, RATE, 1), &effects_document(&[])).unwrap()
}

#[test]
fn test_lifecycle_transitions() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    generate_sine_pcm(&voice, 1_000, 1, 300.0, 0.3).unwrap();

    let session: EffectsSession = Session::new(EngineConfig::default());
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.init(&effects_spec(&voice)).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.progress(), 0);

    let mut buf = vec![0i16; 256];
    assert_eq!(session.get_frame(&mut buf, 256).unwrap(), 256);
    assert_eq!(session.state(), SessionState::Streaming);

    // Re-init from Streaming goes back to Ready
    session.init(&effects_spec(&voice)).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.progress(), 0);

    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(
        session.get_frame(&mut buf, 256),
        Err(SessionError::InvalidState {
            state: SessionState::Stopped,
            ..
        })
    ));
    assert!(session.seek_to(0).is_err());

    session.release();
    assert_eq!(session.state(), SessionState::Released);
    session.stop();
    assert_eq!(session.state(), SessionState::Released);
    assert!(session.get_frame(&mut buf, 256).is_err());

    // Only init is valid after release
    session.init(&effects_spec(&voice)).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.get_frame(&mut buf, 256).unwrap(), 256);
}

#[test]
fn test_seek_past_end_reports_end_of_stream() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    generate_sine_pcm(&voice, 10_000, 1, 300.0, 0.3).unwrap();

    let session: EffectsSession = Session::new(EngineConfig::default());
    session.init(&effects_spec(&voice)).unwrap();
    session.seek_to(127_226).unwrap();
    assert_eq!(session.progress(), 100);

    let mut buf = vec![0i16; 512];
    assert_eq!(session.get_frame(&mut buf, 512).unwrap(), 0);
    assert_eq!(session.progress(), 100);
}

#[test]
fn test_declared_count_mismatch_is_bad_config() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    let bed = dir.path().join("bed.wav");
    generate_silent_pcm(&voice, 1_000, 1).unwrap();
    generate_silent_wav(&bed, 1_000, 2).unwrap();

    let document = serde_json::json!({
        "nb_bgm": 2,
        "bgm": [plain_source(&bed, 0, 1_000)],
    })
    .to_string();
    let err = SessionSpec::from_json(VoiceInput::new(&voice, RATE, 1), &document).unwrap_err();
    assert!(matches!(err, SessionError::BadConfig(_)));
}

#[test]
fn test_failed_init_keeps_previous_state() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    generate_sine_pcm(&voice, 1_000, 1, 300.0, 0.3).unwrap();

    let session: EffectsSession = Session::new(EngineConfig::default());
    let missing = SessionSpec::from_json(
        VoiceInput::new(dir.path().join("missing.mp3"), RATE, 1),
        &effects_document(&[]),
    )
    .unwrap();

    assert!(session.init(&missing).is_err());
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.init(&effects_spec(&voice)).unwrap();
    let mut buf = vec![0i16; 128];
    session.get_frame(&mut buf, 128).unwrap();
    assert!(session.init(&missing).is_err());
    assert_eq!(session.state(), SessionState::Streaming);
    // The previous pipeline is still usable
    assert_eq!(session.get_frame(&mut buf, 128).unwrap(), 128);
}

#[test]
fn test_stop_from_another_thread() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    let bed = dir.path().join("bed.wav");
    generate_sine_pcm(&voice, 120_000, 1, 200.0, 0.3).unwrap();
    generate_sine_wav(&bed, 5_000, 2, 330.0, 0.2).unwrap();

    let engine_config = EngineConfig {
        mix_channels: 2,
        ..EngineConfig::default()
    };
    let session: Arc<MixSession> = Arc::new(Session::new(engine_config));
    let document = mix_document(vec![plain_source(&bed, 0, 120_000)], vec![]);
    session
        .init(&SessionSpec::from_json(VoiceInput::new(&voice, RATE, 1), &document).unwrap())
        .unwrap();

    let stopped = Arc::new(AtomicBool::new(false));
    let pulls = Arc::new(AtomicUsize::new(0));
    let worker = {
        let session = Arc::clone(&session);
        let stopped = Arc::clone(&stopped);
        let pulls = Arc::clone(&pulls);
        thread::spawn(move || {
            let mut buf = vec![0i16; 256 * 2];
            let mut frames_after_stop = 0usize;
            loop {
                let stop_seen_before = stopped.load(Ordering::Acquire);
                match session.get_frame(&mut buf, 256) {
                    Ok(0) => break,
                    Ok(n) => {
                        pulls.fetch_add(1, Ordering::AcqRel);
                        if stop_seen_before {
                            frames_after_stop += n;
                        }
                    }
                    Err(_) => break,
                }
            }
            frames_after_stop
        })
    };

    let wait_started = Instant::now();
    while pulls.load(Ordering::Acquire) == 0 && wait_started.elapsed() < Duration::from_secs(5) {
        thread::yield_now();
    }
    let handle = session.handle();
    handle.stop();
    stopped.store(true, Ordering::Release);
    let stop_issued = Instant::now();

    let frames_after_stop = worker.join().unwrap();
    assert!(stop_issued.elapsed() < Duration::from_secs(2));
    assert_eq!(frames_after_stop, 0);
    assert!(pulls.load(Ordering::Acquire) > 0);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_stop_during_render_reports_stopped() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    let output = dir.path().join("partial.wav");
    generate_sine_pcm(&voice, 300_000, 1, 200.0, 0.3).unwrap();

    let engine = Arc::new(AudioEngine::new(EngineConfig::default()));
    engine
        .effects_init(&SessionSpec::from_json(
            VoiceInput::new(&voice, RATE, 1),
            &effects_document(&[("Reverb", "Church"), ("Beautify", "Bass")]),
        ).unwrap())
        .unwrap();

    let worker = {
        let engine = Arc::clone(&engine);
        let output = output.clone();
        thread::spawn(move || engine.render_effects(&output))
    };
    thread::sleep(Duration::from_millis(20));
    engine.stop_effects();

    // On a fast machine the render may finish first; if the stop lands
    // before the render starts, the render is refused outright.
    match worker.join().unwrap() {
        Ok(RenderOutcome::Stopped) => {
            assert!(engine.effects_progress() < 100);
            let reader = hound::WavReader::open(&output).unwrap();
            assert!((reader.duration() as u64) < 2_400_000);
        }
        Ok(RenderOutcome::Completed) => assert_eq!(engine.effects_progress(), 100),
        Err(err) => assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Stopped,
                ..
            }
        )),
    }
}

#[test]
fn test_progress_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    generate_sine_pcm(&voice, 4_000, 1, 300.0, 0.3).unwrap();

    let session: EffectsSession = Session::new(EngineConfig::default());
    session.init(&effects_spec(&voice)).unwrap();

    let mut buf = vec![0i16; 1_000];
    let mut last = 0;
    loop {
        let n = session.get_frame(&mut buf, 1_000).unwrap();
        let progress = session.progress();
        assert!(progress >= last);
        assert!(progress <= 100);
        last = progress;
        if n == 0 {
            break;
        }
    }
    assert_eq!(last, 100);

    // A backward seek does not move progress back
    session.seek_to(500).unwrap();
    assert_eq!(session.progress(), 100);

    // Re-init starts over
    session.init(&effects_spec(&voice)).unwrap();
    assert_eq!(session.progress(), 0);
}

#[test]
fn test_sessions_are_independent() {
    let dir = TempDir::new().unwrap();
    let voice = dir.path().join("voice.pcm");
    generate_sine_pcm(&voice, 2_000, 1, 300.0, 0.3).unwrap();

    let engine = AudioEngine::new(EngineConfig::default());
    engine.effects_init(&effects_spec(&voice)).unwrap();
    engine.mixer_init(&SessionSpec::from_json(
        VoiceInput::new(&voice, RATE, 1),
        &mix_document(vec![], vec![]),
    ).unwrap()).unwrap();

    engine.stop_mix();
    assert_eq!(engine.mix_session().state(), SessionState::Stopped);
    assert_eq!(engine.effects_session().state(), SessionState::Ready);

    let mut buf = vec![0i16; 512];
    assert_eq!(engine.get_effects_frame(&mut buf, 512).unwrap(), 512);
    assert!(engine.get_mixed_frame(&mut buf, 256).is_err());
}
