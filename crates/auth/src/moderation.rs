//! Ban and mute state machines with lazy, read-time expiry.
//!
//! Each principal carries two independent machines, one per [`PunitiveKind`]:
//!
//! ```text
//!   Clear ──impose──▶ Active(expiry) ──lift / heal──▶ Clear
//!                     ▲            │
//!                     └──impose────┘   (replaces, never extends)
//! ```
//!
//! Nothing expires on a timer. Every reader calls
//! [`ModerationStateMachine::check_and_heal`] before trusting a flag.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use memberhub_core::{DomainError, RetryOutcome, days_rounded_up, write_with_single_retry};

use crate::authorize::Action;
use crate::principal::Principal;
use crate::roles::Role;
use crate::store::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunitiveKind {
    Ban,
    Mute,
}

impl core::fmt::Display for PunitiveKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PunitiveKind::Ban => f.write_str("ban"),
            PunitiveKind::Mute => f.write_str("mute"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "at")]
pub enum Expiry {
    At(DateTime<Utc>),
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "expiry")]
pub enum PunitiveState {
    #[default]
    Clear,
    Active(Expiry),
}

impl PunitiveState {
    /// State produced by imposing for `days`, or permanently when `None`.
    pub fn imposed(days: Option<u32>, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let Some(days) = days else {
            return Ok(PunitiveState::Active(Expiry::Permanent));
        };
        if days == 0 {
            return Err(DomainError::validation(
                "duration must be at least one day; omit it for permanent",
            ));
        }
        Duration::try_days(i64::from(days))
            .and_then(|d| now.checked_add_signed(d))
            .map(|at| PunitiveState::Active(Expiry::At(at)))
            .ok_or_else(|| {
                DomainError::validation(format!("duration of {days} days is out of range"))
            })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PunitiveState::Active(_))
    }

    /// Read-time view: a concrete expiry at or before `now` is `Clear`.
    pub fn healed(&self, now: DateTime<Utc>) -> PunitiveState {
        match self {
            PunitiveState::Active(Expiry::At(at)) if *at <= now => PunitiveState::Clear,
            other => *other,
        }
    }

    /// Days left, rounded up. `None` when clear or permanent.
    pub fn remaining_days(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            PunitiveState::Active(Expiry::At(at)) => Some(days_rounded_up(*at - now)),
            _ => None,
        }
    }
}

/// Outcome of persisting a healed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBack {
    /// The stored state was already current.
    NotNeeded,
    Persisted,
    PersistedOnRetry,
    /// Both attempts failed; the in-request state is still the healed one.
    Failed(DomainError),
}

impl From<RetryOutcome> for WriteBack {
    fn from(value: RetryOutcome) -> Self {
        match value {
            RetryOutcome::Persisted => WriteBack::Persisted,
            RetryOutcome::PersistedOnRetry => WriteBack::PersistedOnRetry,
            RetryOutcome::Failed(err) => WriteBack::Failed(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealReport {
    pub kind: PunitiveKind,
    /// The logical state to use for the rest of the request.
    pub state: PunitiveState,
    pub write_back: WriteBack,
}

/// Ban/mute commands plus read-time healing, persisted through a [`ProfileStore`].
#[derive(Debug, Clone)]
pub struct ModerationStateMachine<S> {
    store: S,
}

impl<S> ModerationStateMachine<S>
where
    S: ProfileStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Overwrite `kind` on `target` with a fresh expiry.
    ///
    /// Replaying the same command at the same instant yields the same state.
    pub fn impose(
        &self,
        actor: Role,
        kind: PunitiveKind,
        target: &mut Principal,
        days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<PunitiveState, DomainError> {
        require_capability(actor, Action::impose(kind))?;
        let state = PunitiveState::imposed(days, now)?;

        self.persist("impose_punitive", target, kind, state)
            .into_result()?;
        target.set_punitive(kind, state);

        info!(principal_id = %target.id, kind = %kind, ?state, "punitive state imposed");
        Ok(state)
    }

    pub fn lift(
        &self,
        actor: Role,
        kind: PunitiveKind,
        target: &mut Principal,
    ) -> Result<PunitiveState, DomainError> {
        require_capability(actor, Action::lift(kind))?;

        self.persist("lift_punitive", target, kind, PunitiveState::Clear)
            .into_result()?;
        target.set_punitive(kind, PunitiveState::Clear);

        info!(principal_id = %target.id, kind = %kind, "punitive state lifted");
        Ok(PunitiveState::Clear)
    }

    /// Reconcile an expired `kind` to `Clear`, in memory first, then in storage.
    ///
    /// Never fails: a failed write-back is logged and reported in the returned
    /// [`HealReport`], while `target` already holds the healed state. The other
    /// kind is left untouched.
    pub fn check_and_heal(
        &self,
        kind: PunitiveKind,
        target: &mut Principal,
        now: DateTime<Utc>,
    ) -> HealReport {
        let current = *target.punitive(kind);
        let healed = current.healed(now);
        if healed == current {
            return HealReport {
                kind,
                state: current,
                write_back: WriteBack::NotNeeded,
            };
        }

        target.set_punitive(kind, healed);
        info!(principal_id = %target.id, kind = %kind, "punitive state expired; healing");

        let outcome = self.persist("heal_punitive", target, kind, healed);
        if let RetryOutcome::Failed(err) = &outcome {
            error!(
                principal_id = %target.id,
                kind = %kind,
                error = %err,
                "failed to persist healed state; request continues with healed value"
            );
        }

        HealReport {
            kind,
            state: healed,
            write_back: outcome.into(),
        }
    }

    fn persist(
        &self,
        operation: &str,
        target: &Principal,
        kind: PunitiveKind,
        state: PunitiveState,
    ) -> RetryOutcome {
        write_with_single_retry(operation, || {
            self.store
                .write_punitive(target.id, kind, &state)
                .map_err(DomainError::from)
        })
    }
}

fn require_capability(actor: Role, action: Action) -> Result<(), DomainError> {
    let required = action.required_role();
    if actor.has_capability(required) {
        Ok(())
    } else {
        Err(DomainError::permission_denied(format!(
            "{} requires {required}, caller is {actor}",
            action.as_str()
        )))
    }
}
