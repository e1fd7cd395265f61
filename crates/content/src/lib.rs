//! `memberhub-content`: course content nodes and entitlement resolution.
//!
//! Decides whether a principal may open a module or lesson right now, from the
//! lock flag, manual grants, subscription plan and drip-release schedule.

pub mod availability;
pub mod grant;
pub mod node;
pub mod repository;

pub use availability::{AnchorPolicy, Availability, EntitlementResolver, LockReason};
pub use grant::{ManualGrant, grant_manual_unlock, revoke_manual_unlock};
pub use node::{ContentKind, ContentNode};
pub use repository::ContentRepository;
