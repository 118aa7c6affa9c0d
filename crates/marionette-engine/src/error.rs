use marionette_core::MarionetteError;
use thiserror::Error;

/// Errors surfaced by the execution engine itself.
///
/// Per-intent failures are never errors; they are recorded as
/// `ActionResult` values with a `FailureReason`. This type covers problems
/// that prevent a batch from running at all.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Trace error: {0}")]
    Trace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<EngineError> for MarionetteError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidIntent(msg) => MarionetteError::Config(msg),
            EngineError::Policy(msg) => MarionetteError::Policy(msg),
            EngineError::Trace(msg) => MarionetteError::Trace(msg),
            EngineError::Io(e) => MarionetteError::Io(e),
            EngineError::Serialization(msg) => MarionetteError::Serialization(msg),
        }
    }
}
