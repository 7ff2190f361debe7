//! Error types for voice-line synthesis

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for synthesis operations
pub type SynthResult<T> = Result<T, SynthError>;

/// Errors that can occur while synthesizing a voice line
#[derive(Error, Debug)]
pub enum SynthError {
    /// The backend never answered within the bootstrap budget. Unrecoverable.
    #[error("TTS backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Voice model not found at '{}'", .0.display())]
    VoiceModelNotFound(PathBuf),

    #[error("No voice available for candidates: {0}")]
    NoVoiceAvailable(String),

    #[error("Synthesis failed: no output at '{}'", .0.display())]
    SynthesisFailed(PathBuf),

    #[error("Lip-sync prerequisite missing: '{}'", .0.display())]
    LipSyncToolMissing(PathBuf),

    /// Model still failed to load after the legacy bootstrap retry. Unrecoverable.
    #[error("Model '{0}' failed to load; restart required")]
    ModelLoadFailed(String),

    #[error("Connection refused by backend: {0}")]
    ConnectionRefused(String),

    #[error("Backend rejected phrase with HTTP {status}: {phrase}")]
    PhraseRejected { status: u16, phrase: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthError {
    /// Classify a transport error. Refused connections become `ConnectionRefused`
    /// so the retry policy can pick them up; everything else is a plain HTTP error.
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_connect() {
            SynthError::ConnectionRefused(err.to_string())
        } else {
            SynthError::Http(err.to_string())
        }
    }

    /// Errors worth a backend restart and another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, SynthError::ConnectionRefused(_))
    }

    /// Errors with no recovery path; the host process should stop.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            SynthError::BackendUnreachable(_) | SynthError::ModelLoadFailed(_)
        )
    }
}

impl From<config::ConfigError> for SynthError {
    fn from(err: config::ConfigError) -> Self {
        SynthError::Config(err.to_string())
    }
}

impl From<csv::Error> for SynthError {
    fn from(err: csv::Error) -> Self {
        SynthError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_refused_connections_are_transient() {
        assert!(SynthError::ConnectionRefused("x".into()).is_transient());
        assert!(!SynthError::Http("x".into()).is_transient());
        assert!(!SynthError::PhraseRejected { status: 500, phrase: "hi".into() }.is_transient());
    }

    #[test]
    fn unrecoverable_variants() {
        assert!(SynthError::BackendUnreachable("down".into()).is_unrecoverable());
        assert!(SynthError::ModelLoadFailed("sk_lydia".into()).is_unrecoverable());
        assert!(!SynthError::LipSyncToolMissing(PathBuf::from("x")).is_unrecoverable());
        assert!(!SynthError::SynthesisFailed(PathBuf::from("out.wav")).is_unrecoverable());
    }
}
