//! Error types for bugline.

use thiserror::Error;
use uuid::Uuid;

use crate::authz::DenialReason;

/// Result type alias using bugline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bugline operations.
///
/// Every variant is terminal to the mutation attempt that raised it: the
/// pipeline never persists a partially validated mutation. Notification and
/// broadcast failures are deliberately NOT represented here — they are
/// logged and swallowed by the phase that encounters them.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bug not found
    #[error("Bug not found: {0}")]
    BugNotFound(Uuid),

    /// Authorization denial, with the rule that rejected the action
    #[error("Forbidden: {0}")]
    Forbidden(DenialReason),

    /// Duplicate watcher, sequence race, or other uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested assignee holds no membership on the bug's project
    #[error("Invalid assignee: {0} is not a project member")]
    InvalidAssignee(Uuid),

    /// Malformed command (bad parent comment, empty title, ...)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
