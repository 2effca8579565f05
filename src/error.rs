//! Error types for a3s-relay

use crate::types::{RequestId, SessionId};
use thiserror::Error;

/// Coarse error category, used by callers to branch without matching every variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    Resource,
    Consensus,
    NotFound,
    Delivery,
    Config,
}

/// Errors that can occur in the relay protocol
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed, empty, or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller is not the session owner (or an authorized delegate)
    #[error("Caller '{caller}' is not authorized for session {session_id}")]
    NotOwner {
        session_id: SessionId,
        caller: String,
    },

    /// Request already left the Pending state
    #[error("Request {0} is already resolved")]
    AlreadyResolved(RequestId),

    /// Session was closed earlier
    #[error("Session {0} is already closed")]
    AlreadyClosed(SessionId),

    /// Operation requires an active session
    #[error("Session {0} is not active")]
    SessionInactive(SessionId),

    /// Mutating call issued from inside a callback handler
    #[error("Re-entrant call rejected: {0}")]
    Reentrant(&'static str),

    /// Session balance does not cover the charge
    #[error("Insufficient balance in session {session_id}: need {required}, have {available}")]
    InsufficientBalance {
        session_id: SessionId,
        required: u64,
        available: u64,
    },

    /// Declared funds do not cover what the operation needs
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// `AllOf` contributions disagree
    #[error("Consensus mismatch for request {0}")]
    ConsensusMismatch(RequestId),

    /// Unknown session
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Unknown request
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// Callback invocation failed (non-fatal, recorded only)
    #[error("Callback delivery failed for request {request_id}: {reason}")]
    Delivery {
        request_id: RequestId,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Validation(_) => ErrorKind::Validation,
            RelayError::NotOwner { .. } => ErrorKind::Authorization,
            RelayError::AlreadyResolved(_)
            | RelayError::AlreadyClosed(_)
            | RelayError::SessionInactive(_)
            | RelayError::Reentrant(_) => ErrorKind::State,
            RelayError::InsufficientBalance { .. } | RelayError::InsufficientFunds(_) => {
                ErrorKind::Resource
            }
            RelayError::ConsensusMismatch(_) => ErrorKind::Consensus,
            RelayError::SessionNotFound(_) | RelayError::RequestNotFound(_) => {
                ErrorKind::NotFound
            }
            RelayError::Delivery { .. } => ErrorKind::Delivery,
            RelayError::Config(_) | RelayError::Serialization(_) => ErrorKind::Config,
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
