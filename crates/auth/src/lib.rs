//! `memberhub-auth`: roles, account standing and action authorization.
//!
//! This crate is intentionally decoupled from HTTP and storage: collaborators
//! are reached through the traits in [`store`].

pub mod authorize;
pub mod moderation;
pub mod principal;
pub mod roles;
pub mod store;

pub use authorize::{
    AccessDecision, AccessEvaluation, AccessExplanation, AccessGate, Action, ActionClass,
    DenialReason, PunitiveNotice,
};
pub use moderation::{
    Expiry, HealReport, ModerationStateMachine, PunitiveKind, PunitiveState, WriteBack,
};
pub use principal::{CorruptField, Identity, Plan, Principal, ProfileField, ProfileRecord};
pub use roles::{OperatorIdentities, Role, RoleResolver, has_capability};
pub use store::{PlanChange, ProfileStore, SessionStore, StoreError};
