//! Error taxonomy for the synchronization engine.

use swarmsync_env::{EnvError, SessionId};
use thiserror::Error;

use crate::temporal::TemporalViolation;

/// Everything that can go wrong inside the engine.
///
/// Only the session variants are meant to reach a caller of the session
/// API; the other variants are absorbed by the orchestrator and counted in
/// the session metrics.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Update rejected by the temporal validator (retry with a fresh timestamp)
    #[error("Temporal inconsistency for {agent_id}: {reason}")]
    TemporalInconsistency {
        agent_id: String,
        reason: TemporalViolation,
    },

    /// Update rejected by the consensus gate
    #[error("Consensus rejected update from {agent_id}")]
    ConsensusRejected { agent_id: String },

    /// No session with this id exists
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// The session exists but is not in a runnable state
    #[error("Session {id} cannot run from state {status}")]
    SessionNotRunnable { id: SessionId, status: String },

    /// An adapter, generator, executor or sink call failed
    #[error("Collaborator failure in {operation}: {source}")]
    CollaboratorFailure {
        operation: String,
        #[source]
        source: EnvError,
    },

    /// A single detection pass could not run
    #[error("Detection pass '{pass}' failed: {reason}")]
    DetectionFailure { pass: &'static str, reason: String },
}

impl SyncError {
    /// Creates a collaborator failure.
    pub fn collaborator(operation: impl Into<String>, source: EnvError) -> Self {
        Self::CollaboratorFailure {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a detection failure.
    pub fn detection(pass: &'static str, reason: impl Into<String>) -> Self {
        Self::DetectionFailure {
            pass,
            reason: reason.into(),
        }
    }

    /// Whether the caller may simply retry (with fresh data).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SyncError::UnknownSession(_) | SyncError::SessionNotRunnable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        let err = SyncError::ConsensusRejected { agent_id: "a".into() };
        assert!(err.is_recoverable());

        let err = SyncError::UnknownSession(SessionId::from_seed(1));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_collaborator_message() {
        let err = SyncError::collaborator("get_status(a)", EnvError::adapter("boom"));
        assert_eq!(err.to_string(), "Collaborator failure in get_status(a): Adapter error: boom");
    }
}
