//! Typed error kinds for the engine, replacing exception-based control flow
//! in the source with a result type callers can match on.
//!
//! Cancellation is modeled as its own variant rather than a generic failure:
//! callers that observe `EngineError::Cancelled` should transition a job to
//! `cancelled`, not `failed`.

use thiserror::Error;

/// The engine's single error type. Every fallible operation in `hre_core`
/// returns `Result<T, EngineError>`; CLI and HTTP boundaries convert this
/// into `anyhow::Error` or an HTTP status respectively.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration: all modalities disabled, missing credentials,
    /// unknown backend kind, or a schema/backend mismatch.
    #[error("configuration error: {0}")]
    ConfigInvalid(String),

    /// Source/connector transport or authentication failure.
    #[error("backend I/O error: {0}")]
    BackendIO(String),

    /// LLM or embedding provider failure: connection, timeout, or malformed response.
    #[error("model I/O error: {0}")]
    ModelIO(String),

    /// A stage hit its hard wall-clock timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// User-initiated cancellation. Not a failure.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The composer is `UNINITIALIZED` (or detected a partial state and reset).
    #[error("{0}")]
    NotReady(String),

    /// An invariant was violated; indicates a bug rather than bad input/environment.
    #[error("internal error: {0}")]
    Bug(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::ConfigInvalid(msg.into())
    }

    pub fn backend_io(msg: impl Into<String>) -> Self {
        EngineError::BackendIO(msg.into())
    }

    pub fn not_ready() -> Self {
        EngineError::NotReady("System not initialized. Please ingest documents first.".to_string())
    }

    /// `true` for errors representing user-initiated cancellation, as opposed
    /// to a fault the operator should investigate.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
