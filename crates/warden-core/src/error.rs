//! Error types for the access broker core.
//!
//! Policy denials and command blocks are not errors; they come back as
//! [`crate::models::AccessDecision`] and [`crate::models::CommandCheckResult`].

use thiserror::Error;

use crate::models::{AccessDecision, ApprovalStatus};

/// Approval workflow errors
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Approval request not found: {0}")]
    NotFound(String),

    #[error("Approval request {id} is already {status}")]
    NotPending { id: String, status: ApprovalStatus },

    #[error("Approver not authorized: {0}")]
    NotAuthorized(String),

    #[error("Approval duration must be between 1 and {max} hours, got {hours}")]
    InvalidDuration { hours: u32, max: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Connection manager errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Session already has a live connection: {0}")]
    AlreadyConnected(String),

    #[error("No connection for session: {0}")]
    NotFound(String),

    #[error("Connection timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session recording errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Recording not found: {0}")]
    NotFound(String),

    /// Stored bytes do not hash to the stored checksum
    #[error("Recording {session_id} failed integrity check (expected {expected}, got {actual})")]
    Integrity {
        session_id: String,
        expected: String,
        actual: String,
    },

    #[error("Recording already exists for session: {0}")]
    AlreadyExists(String),

    #[error("Unsupported recording version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Session broker errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The policy engine refused the request; the decision says why
    #[error("Access denied: {}", .0.reason)]
    Denied(Box<AccessDecision>),

    #[error("No live session: {0}")]
    NotFound(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Recording(#[from] RecordingError),
}

/// Result type alias for approval operations
pub type ApprovalResult<T> = std::result::Result<T, ApprovalError>;

/// Result type alias for connection operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Result type alias for recording operations
pub type RecordingResult<T> = std::result::Result<T, RecordingError>;

/// Result type alias for session broker operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;
