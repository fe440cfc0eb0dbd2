//! Error types for Jarvix

use thiserror::Error;

/// Result type alias for Jarvix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Jarvix
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend could not be reached or answered with a failure status
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend answered with a payload we could not interpret
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Device action outside the supported set
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// Unknown or misconfigured model backend identifier
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Backend did not become live within the startup window
    #[error("startup timeout: {0}")]
    StartupTimeout(String),

    /// Capability registration or invocation error
    #[error("capability error: {0}")]
    Capability(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error came from a remote backend rather than local state
    #[must_use]
    pub const fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_)
                | Self::MalformedResponse(_)
                | Self::StartupTimeout(_)
                | Self::UnsupportedBackend(_)
                | Self::Http(_)
        )
    }
}
