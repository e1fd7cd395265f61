//! `memberhub-core`: shared primitives for the entitlement and moderation engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod error;
pub mod id;
pub mod retry;

pub use clock::{Clock, FixedClock, SystemClock, days_rounded_up};
pub use error::{DomainError, DomainResult};
pub use id::{ContentNodeId, PrincipalId};
pub use retry::{RetryOutcome, write_with_single_retry};
