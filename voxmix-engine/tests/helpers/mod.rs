//! Test helper modules for voxmix-engine integration tests
//!
//! - audio_generator: deterministic WAV and raw PCM fixtures
//! - documents: mix document builders
//! - pull helpers that drain a session into a Vec

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::*;

use serde_json::{json, Value};
use std::path::Path;
use voxmix_engine::session::{Pipeline, Session};

/// One timed source entry as it appears in a mix document.
pub fn source_json(
    url: &Path,
    volume: u8,
    start_ms: u64,
    end_ms: u64,
    fade_in_ms: u64,
    fade_out_ms: u64,
    side_chain: bool,
    make_up_gain: u8,
) -> Value {
    json!({
        "url": url.to_string_lossy(),
        "volume": volume,
        "startTimeMs": start_ms,
        "endTimeMs": end_ms,
        "fadeInTimeMs": fade_in_ms,
        "fadeOutTimeMs": fade_out_ms,
        "sideChain": if side_chain { "On" } else { "Off" },
        "makeUpGain": make_up_gain,
    })
}

/// Plain source: full volume, no fades, no sidechain.
pub fn plain_source(url: &Path, start_ms: u64, end_ms: u64) -> Value {
    source_json(url, 100, start_ms, end_ms, 0, 0, false, 0)
}

pub fn mix_document(bgm: Vec<Value>, music: Vec<Value>) -> String {
    json!({
        "nb_effects": 0,
        "effects": [],
        "nb_bgm": bgm.len(),
        "bgm": bgm,
        "nb_music": music.len(),
        "music": music,
    })
    .to_string()
}

pub fn effects_document(effects: &[(&str, &str)]) -> String {
    let effects: Vec<Value> = effects
        .iter()
        .map(|(name, info)| json!({ "name": name, "info": info }))
        .collect();
    json!({
        "nb_effects": effects.len(),
        "effects": effects,
    })
    .to_string()
}

/// Pull a session to end of stream in `chunk`-frame calls.
pub fn drain<P: Pipeline>(session: &Session<P>, channels: usize, chunk: usize) -> Vec<i16> {
    let mut out = Vec::new();
    let mut buf = vec![0i16; chunk * channels];
    loop {
        let n = session.get_frame(&mut buf, chunk).expect("get_frame failed");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n * channels]);
    }
    out
}
