use std::fmt;

/// Errors returned by orchestrator runtime operations.
#[derive(Debug)]
pub enum EmberError {
    /// Authentication failure (bad shared secret or operator secret).
    Auth(String),
    /// Compute provider API failure.
    Compute(String),
    /// DNS provider API failure.
    Dns(String),
    /// Object storage API failure.
    ObjectStorage(String),
    /// Software artifact metadata lookup failure.
    Artifact(String),
    /// Invalid input or configuration.
    Validation(String),
    /// Requested resource not found.
    NotFound(String),
    /// Persistent store failure.
    Storage(String),
    /// Lifecycle state conflict (illegal or stale transition).
    State(String),
}

impl fmt::Display for EmberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmberError::Auth(msg) => write!(f, "auth error: {msg}"),
            EmberError::Compute(msg) => write!(f, "compute provider error: {msg}"),
            EmberError::Dns(msg) => write!(f, "dns provider error: {msg}"),
            EmberError::ObjectStorage(msg) => write!(f, "object storage error: {msg}"),
            EmberError::Artifact(msg) => write!(f, "artifact resolution error: {msg}"),
            EmberError::Validation(msg) => write!(f, "validation error: {msg}"),
            EmberError::NotFound(msg) => write!(f, "not found: {msg}"),
            EmberError::Storage(msg) => write!(f, "storage error: {msg}"),
            EmberError::State(msg) => write!(f, "state conflict: {msg}"),
        }
    }
}

impl std::error::Error for EmberError {}

pub type Result<T> = std::result::Result<T, EmberError>;
