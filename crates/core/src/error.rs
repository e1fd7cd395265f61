//! Domain error model.

use thiserror::Error;

/// Result type used across the engine.
pub type DomainResult<T> = Result<T, DomainError>;

/// Engine-level error.
///
/// `PermissionDenied` and `NoPrincipal` are meant to be surfaced to callers as-is.
/// `DataIntegrity` makes entitlement decisions fail closed. `Persistence` never
/// changes an in-request decision; it is reported after a single retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The caller's role does not meet the capability required by the command.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No authenticated principal is attached to the request.
    #[error("no authenticated principal")]
    NoPrincipal,

    /// Stored data is inconsistent (dangling reference, corrupt punitive record).
    #[error("data integrity violated: {0}")]
    DataIntegrity(String),

    /// A write to an external collaborator failed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Command arguments failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested principal or content node does not exist.
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
