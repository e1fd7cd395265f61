//! Collaborator contracts: profile store and session layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use memberhub_core::{DomainError, PrincipalId};

use crate::moderation::{PunitiveKind, PunitiveState};
use crate::principal::{Plan, ProfileRecord};
use crate::roles::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found")]
    NotFound,

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(msg) => DomainError::Persistence(msg),
            StoreError::NotFound => DomainError::NotFound,
            StoreError::Corrupt(msg) => DomainError::DataIntegrity(msg),
        }
    }
}

/// Plan fields written by a plan-change command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanChange {
    pub plan: Option<Plan>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Only set when the principal had no activation anchor yet.
    pub activated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Per-principal profile fields held by the hosted backend.
///
/// Writes are last-write-wins; implementations need no optimistic locking.
pub trait ProfileStore: Send + Sync {
    fn load(&self, id: PrincipalId) -> Result<Option<ProfileRecord>, StoreError>;

    fn write_punitive(
        &self,
        id: PrincipalId,
        kind: PunitiveKind,
        state: &PunitiveState,
    ) -> Result<(), StoreError>;

    fn write_role(&self, id: PrincipalId, role: Role) -> Result<(), StoreError>;

    fn write_plan(&self, id: PrincipalId, change: &PlanChange) -> Result<(), StoreError>;
}

impl<S> ProfileStore for Arc<S>
where
    S: ProfileStore + ?Sized,
{
    fn load(&self, id: PrincipalId) -> Result<Option<ProfileRecord>, StoreError> {
        (**self).load(id)
    }

    fn write_punitive(
        &self,
        id: PrincipalId,
        kind: PunitiveKind,
        state: &PunitiveState,
    ) -> Result<(), StoreError> {
        (**self).write_punitive(id, kind, state)
    }

    fn write_role(&self, id: PrincipalId, role: Role) -> Result<(), StoreError> {
        (**self).write_role(id, role)
    }

    fn write_plan(&self, id: PrincipalId, change: &PlanChange) -> Result<(), StoreError> {
        (**self).write_plan(id, change)
    }
}

/// Session layer: ends a principal's active sessions.
pub trait SessionStore: Send + Sync {
    /// Returns how many sessions were ended.
    fn invalidate_sessions(&self, id: PrincipalId) -> Result<usize, StoreError>;
}

impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    fn invalidate_sessions(&self, id: PrincipalId) -> Result<usize, StoreError> {
        (**self).invalidate_sessions(id)
    }
}
