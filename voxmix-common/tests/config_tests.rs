//! Configuration document tests against files on disk
//!
//! Covers:
//! - legacy documents whose lists are JSON-encoded strings
//! - write-back always producing nested arrays
//! - file-level error classification

use serde_json::Value;
use std::fs;
use tempfile::TempDir;
use voxmix_common::{Config, ConfigError, FadeCurve, TrackKind};

const LEGACY_DOCUMENT: &str = r#"{
    "nb_effects": 2,
    "effects": "[{\"name\":\"Reverb\",\"info\":\"Church\"},{\"name\":\"NoiseSuppression\",\"info\":\"On\"}]",
    "nb_bgm": 1,
    "bgm": "[{\"url\":\"/media/bed.mp3\",\"volume\":80,\"startTimeMs\":5000,\"endTimeMs\":17000,\"fadeInTimeMs\":3000,\"fadeOutTimeMs\":3000,\"sideChain\":\"On\",\"makeUpGain\":50}]",
    "nb_music": 0,
    "music": "[]"
}"#;

#[test]
fn test_legacy_document_round_trips_as_nested_json() {
    let dir = TempDir::new().unwrap();
    let legacy = dir.path().join("legacy.json");
    fs::write(&legacy, LEGACY_DOCUMENT).unwrap();

    let config = Config::from_path(&legacy).unwrap();
    assert_eq!(config.effects.len(), 2);
    assert_eq!(config.effect_parameter("reverb"), Some("Church"));
    assert_eq!(config.bgm.len(), 1);
    assert!(config.bgm[0].side_chain);
    assert_eq!(config.bgm[0].make_up_gain, 50);

    let written = config.to_json();
    let value: Value = serde_json::from_str(&written).unwrap();
    assert!(value["effects"].is_array());
    assert!(value["bgm"].is_array());
    assert!(value["music"].is_array());
    assert_eq!(value["nb_bgm"], 1);

    let rewritten = dir.path().join("nested.json");
    fs::write(&rewritten, &written).unwrap();
    assert_eq!(Config::from_path(&rewritten).unwrap(), config);
}

#[test]
fn test_sources_follow_mix_order() {
    let document = r#"{
        "bgm": [
            {"url": "b0.mp3", "startTimeMs": 0, "endTimeMs": 1000},
            {"url": "b1.mp3", "startTimeMs": 500, "endTimeMs": 1500}
        ],
        "music": [
            {"url": "m0.mp3", "startTimeMs": 0, "endTimeMs": 1000, "fadeCurve": "equal_power"}
        ]
    }"#;
    let config = Config::parse(document).unwrap();
    let order: Vec<(TrackKind, &str)> = config
        .sources()
        .map(|(kind, source)| (kind, source.url.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (TrackKind::Bgm, "b0.mp3"),
            (TrackKind::Bgm, "b1.mp3"),
            (TrackKind::Music, "m0.mp3"),
        ]
    );
    assert_eq!(config.music[0].fade_curve, Some(FadeCurve::EqualPower));
    assert_eq!(config.bgm[0].volume, 100);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_truncated_file_is_malformed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.json");
    fs::write(&path, &LEGACY_DOCUMENT[..LEGACY_DOCUMENT.len() / 2]).unwrap();
    assert!(matches!(
        Config::from_path(&path).unwrap_err(),
        ConfigError::Malformed(_)
    ));
}

#[test]
fn test_count_mismatch_in_file_is_invalid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mismatch.json");
    fs::write(
        &path,
        r#"{"nb_bgm": 2, "bgm": [{"url": "a.mp3", "startTimeMs": 0, "endTimeMs": 10}]}"#,
    )
    .unwrap();
    assert!(matches!(
        Config::from_path(&path).unwrap_err(),
        ConfigError::Invalid(_)
    ));
}
