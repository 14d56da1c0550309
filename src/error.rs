//! Error taxonomy for session operations.

use crate::types::{GamePhase, SessionCode};

pub type SessionResult<T> = Result<T, SessionError>;

/// Every way a session operation can be refused. None of these leave a
/// session partially mutated: operations validate before they change state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    SessionNotFound(SessionCode),

    /// Usually a race with question advancement, not a user mistake
    #[error("Stale submission: {0}")]
    StaleSubmission(String),

    #[error("Unauthorized: {0}")]
    UnauthorizedAction(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Session {0} is full")]
    SessionFull(SessionCode),

    #[error("Cannot {action} while in {phase:?}")]
    InvalidPhase {
        action: &'static str,
        phase: GamePhase,
    },

    #[error("Rematch is only available for two-player head-to-head sessions")]
    RematchUnavailable,
}

impl SessionError {
    /// Stable code sent to clients in `error` messages
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            SessionError::StaleSubmission(_) => "STALE_SUBMISSION",
            SessionError::UnauthorizedAction(_) => "UNAUTHORIZED",
            SessionError::MalformedRequest(_) => "MALFORMED_REQUEST",
            SessionError::SessionFull(_) => "SESSION_FULL",
            SessionError::InvalidPhase { .. } => "INVALID_PHASE",
            SessionError::RematchUnavailable => "REMATCH_UNAVAILABLE",
        }
    }

    /// Stale submissions are dropped silently; everything else goes back to the actor
    pub fn is_reportable(&self) -> bool {
        !matches!(self, SessionError::StaleSubmission(_))
    }
}
