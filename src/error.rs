//! Error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::playback::PlaybackState;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The input could not be read or its format is not supported.
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Time window with non-finite or inverted bounds.
    #[error("invalid time window {start}s..{end}s")]
    InvalidWindow { start: f64, end: f64 },

    /// Time stretch error.
    #[error("time stretch error: {0}")]
    Stretch(String),

    /// Audio output failed while playing.
    #[error("playback error: {0}")]
    Playback(String),

    /// Controller command issued in a state that does not accept it.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: PlaybackState,
    },

    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,

    #[error("no audio loaded")]
    NoAudioLoaded,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hound error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// A video whose audio track could not be extracted counts as undecodable.
    pub(crate) fn demux(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Decode {
            path: path.into(),
            reason: format!("audio track extraction failed: {}", reason.to_string()),
        }
    }
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
