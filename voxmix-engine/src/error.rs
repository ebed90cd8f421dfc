//! Error types for voxmix-engine
//!
//! Each component has its own error enum; [`Error`] wraps them for callers
//! that do not care which layer failed.

use std::path::PathBuf;
use thiserror::Error;
use voxmix_common::{ConfigError, TrackKind};

use crate::session::SessionState;

/// Decoding failures for a single source.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Source file could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container or codec not recognized
    #[error("Unsupported audio format in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    /// I/O kept failing after the retry budget was spent
    #[error("I/O error reading {path} after {attempts} attempts: {reason}")]
    Io {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    /// Too many consecutive undecodable packets
    #[error("Corrupt stream {path}: {failures} consecutive packets failed to decode")]
    Corrupt { path: PathBuf, failures: u32 },

    /// Sample-rate conversion failed
    #[error("Resampling failed: {0}")]
    Resample(String),

    /// Caller asked for an impossible output layout
    #[error("Invalid output format: {0}")]
    InvalidFormat(String),

    /// A stop request arrived while the decoder was skipping or reading
    #[error("Decoding interrupted")]
    Interrupted,
}

/// Voice effect configuration failures.
///
/// These are never fatal for a session: the offending effect is logged and
/// skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("Invalid parameter '{parameter}' for effect {effect}")]
    InvalidParameter { effect: String, parameter: String },
}

/// Failures surfaced by the pull-session API.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    BadConfig(#[from] ConfigError),

    #[error("I/O failure on {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Decode(DecodeError),

    #[error("Encoder failure: {0}")]
    Encode(String),

    #[error("Session was stopped")]
    Cancelled,

    /// The request can never succeed as given, e.g. a buffer too small for
    /// one frame
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<DecodeError> for SessionError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Interrupted => SessionError::Cancelled,
            other => SessionError::Decode(other),
        }
    }
}

impl SessionError {
    /// Negative sentinel code for callers that speak the integer pull protocol.
    ///
    /// Zero and positive values are reserved for frame counts.
    pub fn code(&self) -> i32 {
        match self {
            SessionError::InvalidState { .. } => -1,
            SessionError::BadConfig(_) => -2,
            SessionError::IoFailure { .. } => -3,
            SessionError::Decode(_) => -4,
            SessionError::Encode(_) => -5,
            SessionError::Cancelled => -6,
            SessionError::InvalidArgument(_) => -7,
        }
    }
}

/// Main error type for voxmix-engine
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Engine tuning file could not be loaded
    #[error("Engine configuration error: {0}")]
    EngineConfig(String),

    #[error("No decoder open in the {0} slot")]
    EmptySlot(TrackKind),

    #[error("Fade envelope has not been initialized")]
    NoFadeEnvelope,

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let errors = vec![
            SessionError::InvalidState {
                operation: "get_frame",
                state: SessionState::Uninitialized,
            },
            SessionError::BadConfig(ConfigError::Invalid("x".into())),
            SessionError::IoFailure {
                path: PathBuf::from("voice.pcm"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
            SessionError::Decode(DecodeError::Resample("x".into())),
            SessionError::Encode("x".into()),
            SessionError::Cancelled,
            SessionError::InvalidArgument("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_interrupted_decode_reads_as_cancelled() {
        let err: SessionError = DecodeError::Interrupted.into();
        assert!(matches!(err, SessionError::Cancelled));
        let err: SessionError = DecodeError::Resample("x".into()).into();
        assert!(matches!(err, SessionError::Decode(DecodeError::Resample(_))));
    }

    #[test]
    fn test_invalid_state_message_names_state() {
        let err = SessionError::InvalidState {
            operation: "seek_to",
            state: SessionState::Released,
        };
        assert_eq!(err.to_string(), "seek_to is not allowed in state Released");
    }
}
