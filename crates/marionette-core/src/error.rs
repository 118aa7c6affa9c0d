use thiserror::Error;

/// Top-level error type for the Marionette system.
///
/// Each variant wraps a subsystem-specific failure. The engine crate defines
/// its own error type and implements `From<EngineError> for MarionetteError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MarionetteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Trace error: {0}")]
    Trace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for MarionetteError {
    fn from(err: toml::de::Error) -> Self {
        MarionetteError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MarionetteError {
    fn from(err: toml::ser::Error) -> Self {
        MarionetteError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MarionetteError {
    fn from(err: serde_json::Error) -> Self {
        MarionetteError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Marionette operations.
pub type Result<T> = std::result::Result<T, MarionetteError>;
