//! Error types for the Swarmsync environment abstraction.

use thiserror::Error;

/// Errors raised by environment-facing I/O (adapters, test collaborators, clock).
#[derive(Debug, Clone, Error)]
pub enum EnvError {
    /// The collaborator answered with an error
    #[error("Adapter error: {0}")]
    AdapterError(String),
    
    /// The target agent or service could not be reached
    #[error("Unavailable: {0}")]
    Unavailable(String),
    
    /// Payload could not be encoded/decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
    
    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates an adapter error.
    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::AdapterError(msg.into())
    }
    
    /// Creates an unavailable error.
    pub fn unavailable(target: impl std::fmt::Display) -> Self {
        Self::Unavailable(target.to_string())
    }
    
    /// Creates a timeout error from a duration.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }
}
