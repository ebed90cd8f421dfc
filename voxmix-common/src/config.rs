//! Mix/effects configuration document
//!
//! One JSON document describes a whole session:
//!
//! ```json
//! {
//!   "nb_effects": 1,
//!   "effects": [ { "name": "Reverb", "info": "Hall" } ],
//!   "nb_bgm": 1,
//!   "bgm": [ { "url": "/sdcard/bed.mp3", "volume": 80,
//!              "startTimeMs": 5000, "endTimeMs": 17000,
//!              "fadeInTimeMs": 3000, "fadeOutTimeMs": 3000,
//!              "sideChain": "On", "makeUpGain": 50,
//!              "cropStartTimeMs": 0, "cropEndTimeMs": -1 } ],
//!   "nb_music": 0,
//!   "music": []
//! }
//! ```
//!
//! Older producers wrote `effects`/`bgm`/`music` as strings that themselves
//! contain a JSON array. Both forms are read. [`Config::to_json`] always
//! writes nested arrays.
//!
//! The `nb_*` counts are optional; when present they must match the list
//! lengths. `cropStartTimeMs`/`cropEndTimeMs` select the part of the file a
//! source plays; an end of -1 (or none) means the end of the file.

use crate::error::{ConfigError, Result};
use crate::fade_curves::FadeCurve;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Largest accepted `volume` / `makeUpGain` percentage.
pub const MAX_PERCENT: u8 = 100;

/// One named voice effect and its parameter string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSpec {
    pub name: String,
    #[serde(rename = "info", alias = "parameter")]
    pub parameter: String,
}

impl EffectSpec {
    pub fn new(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: parameter.into(),
        }
    }
}

/// Which list a timed source came from.
///
/// Each kind has its own decoder slot; the two never share a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Bgm,
    Music,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Bgm => write!(f, "bgm"),
            TrackKind::Music => write!(f, "music"),
        }
    }
}

/// A background or music source placed on the absolute session timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedAudioSource {
    pub url: String,
    /// Linear percentage of full scale, 0–100.
    pub volume: u8,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub fade_in_time_ms: u64,
    pub fade_out_time_ms: u64,
    #[serde(serialize_with = "serialize_switch")]
    pub side_chain: bool,
    /// Percentage of the engine's maximum makeup gain, 0–100. Zero unless
    /// `side_chain` is set.
    pub make_up_gain: u8,
    /// Fade shape; the engine default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_curve: Option<FadeCurve>,
    /// Offset into the file where playback begins.
    #[serde(skip_serializing_if = "is_zero")]
    pub crop_start_time_ms: u64,
    /// Offset into the file where playback ends; `None` plays to the end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_end_time_ms: Option<u64>,
}

impl TimedAudioSource {
    /// Length of the active window in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.end_time_ms - self.start_time_ms
    }

    /// True when only part of the file is played.
    pub fn is_cropped(&self) -> bool {
        self.crop_start_time_ms > 0 || self.crop_end_time_ms.is_some()
    }

    /// Linear base gain derived from `volume`.
    pub fn base_gain(&self) -> f32 {
        self.volume as f32 / MAX_PERCENT as f32
    }

    fn overlaps(&self, other: &TimedAudioSource) -> bool {
        self.start_time_ms < other.end_time_ms && other.start_time_ms < self.end_time_ms
    }
}

/// Parsed and validated configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Effects after merging by name: first position wins, last value wins.
    pub effects: Vec<EffectSpec>,
    pub bgm: Vec<TimedAudioSource>,
    pub music: Vec<TimedAudioSource>,
}

impl Config {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    /// - [`ConfigError::Malformed`] for JSON syntax errors and wrong value types
    /// - [`ConfigError::Invalid`] for semantic violations (count mismatch,
    ///   empty windows, out-of-range percentages, overlapping sidechained beds)
    pub fn parse(document: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(document)?;

        let effects: Vec<EffectSpec> = decode_list(raw.effects, "effects")?;
        let bgm: Vec<RawSource> = decode_list(raw.bgm, "bgm")?;
        let music: Vec<RawSource> = decode_list(raw.music, "music")?;

        check_count("nb_effects", raw.nb_effects, effects.len())?;
        check_count("nb_bgm", raw.nb_bgm, bgm.len())?;
        check_count("nb_music", raw.nb_music, music.len())?;

        for effect in &effects {
            if effect.name.trim().is_empty() {
                return Err(ConfigError::Invalid("effect name is empty".to_string()));
            }
            if effect.parameter.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "effect '{}' has an empty parameter",
                    effect.name
                )));
            }
        }

        let bgm = bgm
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.validate(TrackKind::Bgm, i))
            .collect::<Result<Vec<_>>>()?;
        let music = music
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.validate(TrackKind::Music, i))
            .collect::<Result<Vec<_>>>()?;

        check_sidechain_overlap(TrackKind::Bgm, &bgm)?;
        check_sidechain_overlap(TrackKind::Music, &music)?;

        let config = Config {
            effects: merge_effects(effects),
            bgm,
            music,
        };
        debug!("Parsed configuration: {}", config.summary());
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&document)
    }

    /// Serialize back to a document with nested arrays and matching counts.
    pub fn to_json(&self) -> String {
        let document = ConfigDocument {
            nb_effects: self.effects.len(),
            effects: &self.effects,
            nb_bgm: self.bgm.len(),
            bgm: &self.bgm,
            nb_music: self.music.len(),
            music: &self.music,
        };
        // Plain structs of strings and integers cannot fail to serialize.
        serde_json::to_string_pretty(&document).unwrap_or_default()
    }

    /// All timed sources in mix order: bgm list first, then music, each in
    /// insertion order.
    pub fn sources(&self) -> impl Iterator<Item = (TrackKind, &TimedAudioSource)> {
        self.bgm
            .iter()
            .map(|s| (TrackKind::Bgm, s))
            .chain(self.music.iter().map(|s| (TrackKind::Music, s)))
    }

    /// Look up the resolved parameter for an effect (case-insensitive).
    pub fn effect_parameter(&self, name: &str) -> Option<&str> {
        self.effects
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.parameter.as_str())
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let effects: Vec<String> = self
            .effects
            .iter()
            .map(|e| format!("{}={}", e.name, e.parameter))
            .collect();
        format!(
            "effects=[{}] bgm={} music={}",
            effects.join(", "),
            self.bgm.len(),
            self.music.len()
        )
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    nb_effects: Option<i64>,
    #[serde(default)]
    effects: Option<Value>,
    #[serde(default)]
    nb_bgm: Option<i64>,
    #[serde(default)]
    bgm: Option<Value>,
    #[serde(default)]
    nb_music: Option<i64>,
    #[serde(default)]
    music: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(alias = "file_path")]
    url: String,
    #[serde(default = "default_volume")]
    volume: i64,
    start_time_ms: i64,
    end_time_ms: i64,
    #[serde(default)]
    fade_in_time_ms: i64,
    #[serde(default)]
    fade_out_time_ms: i64,
    #[serde(default)]
    side_chain: Option<Switch>,
    #[serde(default)]
    make_up_gain: Option<i64>,
    #[serde(default)]
    fade_curve: Option<FadeCurve>,
    #[serde(default)]
    crop_start_time_ms: i64,
    #[serde(default)]
    crop_end_time_ms: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Switch {
    Flag(bool),
    Text(String),
}

#[derive(Serialize)]
struct ConfigDocument<'a> {
    nb_effects: usize,
    effects: &'a [EffectSpec],
    nb_bgm: usize,
    bgm: &'a [TimedAudioSource],
    nb_music: usize,
    music: &'a [TimedAudioSource],
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn default_volume() -> i64 {
    MAX_PERCENT as i64
}

fn serialize_switch<S: Serializer>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "On" } else { "Off" })
}

impl RawSource {
    fn validate(self, kind: TrackKind, index: usize) -> Result<TimedAudioSource> {
        let at = format!("{}[{}]", kind, index);

        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{}: url is empty", at)));
        }
        if self.start_time_ms < 0 || self.end_time_ms < 0 {
            return Err(ConfigError::Invalid(format!("{}: negative window time", at)));
        }
        if self.end_time_ms <= self.start_time_ms {
            return Err(ConfigError::Invalid(format!(
                "{}: endTimeMs ({}) must be greater than startTimeMs ({})",
                at, self.end_time_ms, self.start_time_ms
            )));
        }
        if self.fade_in_time_ms < 0 || self.fade_out_time_ms < 0 {
            return Err(ConfigError::Invalid(format!("{}: negative fade time", at)));
        }
        let volume = percent(self.volume, &at, "volume")?;

        if self.crop_start_time_ms < 0 {
            return Err(ConfigError::Invalid(format!("{}: negative cropStartTimeMs", at)));
        }
        let crop_end_time_ms = match self.crop_end_time_ms {
            None | Some(-1) => None,
            Some(end) if end <= self.crop_start_time_ms => {
                return Err(ConfigError::Invalid(format!(
                    "{}: cropEndTimeMs ({}) must be greater than cropStartTimeMs ({}) or -1",
                    at, end, self.crop_start_time_ms
                )))
            }
            Some(end) => Some(end as u64),
        };

        let side_chain = match self.side_chain {
            None => false,
            Some(Switch::Flag(flag)) => flag,
            Some(Switch::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "on" => true,
                "off" | "" => false,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "{}: sideChain must be On or Off, got '{}'",
                        at, other
                    )))
                }
            },
        };

        let make_up_gain = if side_chain {
            let gain = self.make_up_gain.ok_or_else(|| {
                ConfigError::Invalid(format!("{}: makeUpGain is required when sideChain is On", at))
            })?;
            percent(gain, &at, "makeUpGain")?
        } else {
            0
        };

        Ok(TimedAudioSource {
            url: self.url,
            volume,
            start_time_ms: self.start_time_ms as u64,
            end_time_ms: self.end_time_ms as u64,
            fade_in_time_ms: self.fade_in_time_ms as u64,
            fade_out_time_ms: self.fade_out_time_ms as u64,
            side_chain,
            make_up_gain,
            fade_curve: self.fade_curve,
            crop_start_time_ms: self.crop_start_time_ms as u64,
            crop_end_time_ms,
        })
    }
}

fn percent(value: i64, at: &str, field: &str) -> Result<u8> {
    if (0..=MAX_PERCENT as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ConfigError::Invalid(format!(
            "{}: {} must be within 0..={}, got {}",
            at, field, MAX_PERCENT, value
        )))
    }
}

/// Read a list that is either a nested array or a string holding one.
fn decode_list<T: DeserializeOwned>(value: Option<Value>, field: &str) -> Result<Vec<T>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(text)) => {
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(&text)
                .map_err(|e| ConfigError::Malformed(format!("{}: {}", field, e)))
        }
        Some(array @ Value::Array(_)) => serde_json::from_value(array)
            .map_err(|e| ConfigError::Malformed(format!("{}: {}", field, e))),
        Some(other) => Err(ConfigError::Malformed(format!(
            "{}: expected an array, got {}",
            field, other
        ))),
    }
}

fn check_count(field: &str, declared: Option<i64>, actual: usize) -> Result<()> {
    match declared {
        Some(n) if n != actual as i64 => Err(ConfigError::Invalid(format!(
            "{} is {} but the list holds {} entries",
            field, n, actual
        ))),
        _ => Ok(()),
    }
}

/// Sidechained sources of one kind share one voice trigger; their windows
/// must not overlap.
fn check_sidechain_overlap(kind: TrackKind, sources: &[TimedAudioSource]) -> Result<()> {
    let ducked: Vec<(usize, &TimedAudioSource)> =
        sources.iter().enumerate().filter(|(_, s)| s.side_chain).collect();
    for (i, (ai, a)) in ducked.iter().enumerate() {
        for (bi, b) in &ducked[i + 1..] {
            if a.overlaps(b) {
                return Err(ConfigError::Invalid(format!(
                    "{}[{}] and {}[{}] are both sidechained and overlap in time",
                    kind, ai, kind, bi
                )));
            }
        }
    }
    Ok(())
}

fn merge_effects(effects: Vec<EffectSpec>) -> Vec<EffectSpec> {
    let mut merged: Vec<EffectSpec> = Vec::with_capacity(effects.len());
    for effect in effects {
        match merged.iter_mut().find(|e| e.name.eq_ignore_ascii_case(&effect.name)) {
            Some(existing) => existing.parameter = effect.parameter,
            None => merged.push(effect),
        }
    }
    merged
}
