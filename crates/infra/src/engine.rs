//! Membership engine: the query/command surface callers use.
//!
//! ```text
//! caller identity
//!   ↓
//! 1. Read the clock once
//!   ↓
//! 2. Load + validate the profile record into a Principal
//!   ↓
//! 3. Heal ban/mute, authorize through the AccessGate
//!   ↓
//! 4. Evaluate the query, or apply the command through its collaborator
//! ```
//!
//! The engine holds no state of its own; everything is read from and written to
//! the injected profile store, content repository and session layer.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use memberhub_auth::{
    AccessDecision, AccessExplanation, AccessGate, Action, DenialReason, HealReport, Identity,
    ModerationStateMachine, Plan, PlanChange, Principal, ProfileStore, PunitiveKind,
    PunitiveState, Role, SessionStore,
};
use memberhub_content::{
    Availability, ContentRepository, EntitlementResolver, ManualGrant, grant_manual_unlock,
    revoke_manual_unlock,
};
use memberhub_core::{Clock, ContentNodeId, DomainError, PrincipalId, write_with_single_retry};

use crate::config::EngineConfig;

/// A principal's current standing, healed at read time (e.g. on sign-in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub principal_id: PrincipalId,
    pub role: Role,
    pub ban: HealReport,
    pub mute: HealReport,
}

/// Result of banning a principal and ending their sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanOutcome {
    pub state: PunitiveState,
    /// Sessions ended, or why ending them failed. The ban stands either way.
    pub sessions_ended: Result<usize, DomainError>,
}

pub struct MembershipEngine<P, C, S, K> {
    profiles: P,
    content: C,
    sessions: S,
    clock: K,
    gate: AccessGate<P>,
    entitlements: EntitlementResolver,
}

impl<P, C, S, K> MembershipEngine<P, C, S, K>
where
    P: ProfileStore + Clone,
    C: ContentRepository,
    S: SessionStore,
    K: Clock,
{
    pub fn new(
        config: &EngineConfig,
        profiles: P,
        content: C,
        sessions: S,
        clock: K,
    ) -> Result<Self, DomainError> {
        let gate = AccessGate::new(
            config.role_resolver()?,
            ModerationStateMachine::new(profiles.clone()),
        );
        Ok(Self {
            profiles,
            content,
            sessions,
            clock,
            gate,
            entitlements: config.entitlement_resolver(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn resolve_role(&self, identity: &Identity) -> Result<Role, DomainError> {
        let principal = self.load_caller(identity)?;
        self.gate.resolver().resolve(&principal)
    }

    /// Heal and report both punitive states; meant for sign-in.
    pub fn standing(&self, identity: &Identity) -> Result<Standing, DomainError> {
        let now = self.clock.now();
        let mut principal = self.load_caller(identity)?;
        let role = self.gate.resolver().resolve(&principal)?;
        let moderation = self.gate.moderation();

        Ok(Standing {
            principal_id: principal.id,
            role,
            ban: moderation.check_and_heal(PunitiveKind::Ban, &mut principal, now),
            mute: moderation.check_and_heal(PunitiveKind::Mute, &mut principal, now),
        })
    }

    /// Unauthenticated callers get `Denied(NoPrincipal)`, not an error.
    pub fn check_access(
        &self,
        identity: &Identity,
        action: Action,
        resource_owner: Option<PrincipalId>,
    ) -> Result<AccessDecision, DomainError> {
        let now = self.clock.now();
        let mut principal = match self.load_caller(identity) {
            Ok(principal) => principal,
            Err(DomainError::NoPrincipal) => {
                return Ok(AccessDecision::Denied(DenialReason::NoPrincipal));
            }
            Err(err) => return Err(err),
        };
        Ok(self.gate.check_access(&mut principal, action, resource_owner, now))
    }

    pub fn explain_access(
        &self,
        identity: &Identity,
        action: Action,
        resource_owner: Option<PrincipalId>,
    ) -> Result<AccessExplanation, DomainError> {
        let now = self.clock.now();
        let mut principal = self.load_caller(identity)?;
        Ok(self.gate.explain(&mut principal, action, resource_owner, now))
    }

    /// Content-side failures, and corrupt plan or anchor timestamps the decision
    /// needs, fail closed as `Locked(Unknown)`; only caller problems (no
    /// principal, unreadable profile or punitive columns) are errors.
    pub fn resolve_availability(
        &self,
        identity: &Identity,
        node_id: ContentNodeId,
    ) -> Result<Availability, DomainError> {
        let now = self.clock.now();
        let principal = self.load_caller(identity)?;
        Ok(self.entitlements.resolve(&self.content, &principal, node_id, now))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    pub fn impose_punitive(
        &self,
        actor: &Identity,
        kind: PunitiveKind,
        target_id: PrincipalId,
        days: Option<u32>,
    ) -> Result<PunitiveState, DomainError> {
        let now = self.clock.now();
        let (_, role) = self.authorize(actor, Action::impose(kind), now)?;
        let mut target = self.load_target(target_id)?;
        self.gate
            .moderation()
            .impose(role, kind, &mut target, days, now)
    }

    pub fn lift_punitive(
        &self,
        actor: &Identity,
        kind: PunitiveKind,
        target_id: PrincipalId,
    ) -> Result<PunitiveState, DomainError> {
        let now = self.clock.now();
        let (_, role) = self.authorize(actor, Action::lift(kind), now)?;
        let mut target = self.load_target(target_id)?;
        self.gate.moderation().lift(role, kind, &mut target)
    }

    /// Ban, then end the target's sessions as a separate follow-up step.
    pub fn ban_and_end_session(
        &self,
        actor: &Identity,
        target_id: PrincipalId,
        days: Option<u32>,
    ) -> Result<BanOutcome, DomainError> {
        let state = self.impose_punitive(actor, PunitiveKind::Ban, target_id, days)?;

        let sessions_ended = self
            .sessions
            .invalidate_sessions(target_id)
            .map_err(DomainError::from);
        match &sessions_ended {
            Ok(ended) => info!(principal_id = %target_id, ended, "sessions ended after ban"),
            Err(err) => warn!(
                principal_id = %target_id,
                error = %err,
                "ban recorded but sessions could not be ended"
            ),
        }

        Ok(BanOutcome {
            state,
            sessions_ended,
        })
    }

    pub fn grant_manual_unlock(
        &self,
        actor: &Identity,
        principal_id: PrincipalId,
        node_id: ContentNodeId,
    ) -> Result<bool, DomainError> {
        let now = self.clock.now();
        let (actor, role) = self.authorize(actor, Action::ForceUnlockContent, now)?;
        self.load_target(principal_id)?;

        grant_manual_unlock(
            &self.content,
            role,
            ManualGrant {
                principal_id,
                node_id,
                granted_by: actor.id,
                granted_at: now,
            },
        )
    }

    pub fn revoke_manual_unlock(
        &self,
        actor: &Identity,
        principal_id: PrincipalId,
        node_id: ContentNodeId,
    ) -> Result<bool, DomainError> {
        let now = self.clock.now();
        let (_, role) = self.authorize(actor, Action::ForceUnlockContent, now)?;
        revoke_manual_unlock(&self.content, role, principal_id, node_id)
    }

    pub fn change_role(
        &self,
        actor: &Identity,
        target_id: PrincipalId,
        new_role: Role,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        let (_, role) = self.authorize(actor, Action::ChangeRole, now)?;
        let target = self.load_target(target_id)?;
        self.gate
            .resolver()
            .validate_role_change(role, &target, new_role)?;

        write_with_single_retry("change_role", || {
            self.profiles
                .write_role(target_id, new_role)
                .map_err(DomainError::from)
        })
        .into_result()?;
        info!(principal_id = %target_id, role = %new_role, "role changed");
        Ok(())
    }

    /// Change the target's plan. The activation anchor is only set the first time.
    pub fn change_plan(
        &self,
        actor: &Identity,
        target_id: PrincipalId,
        plan: Option<Plan>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        self.authorize(actor, Action::ChangePlan, now)?;
        let target = self.load_target(target_id)?;

        // A corrupt activation column reads as absent and is replaced.
        let change = PlanChange {
            activated_at: (target.plan_activated_at.is_none() && plan.is_some()).then_some(now),
            plan,
            expires_at,
            updated_at: now,
        };
        write_with_single_retry("change_plan", || {
            self.profiles
                .write_plan(target_id, &change)
                .map_err(DomainError::from)
        })
        .into_result()?;
        info!(principal_id = %target_id, plan = ?change.plan, "plan changed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn load_caller(&self, identity: &Identity) -> Result<Principal, DomainError> {
        let id = identity.principal_id()?;
        self.profiles
            .load(id)?
            .ok_or_else(DomainError::not_found)?
            .into_principal(identity)
    }

    fn load_target(&self, id: PrincipalId) -> Result<Principal, DomainError> {
        let identity = Identity {
            id: Some(id),
            email: None,
            authenticated: true,
        };
        self.load_caller(&identity)
    }

    /// Gate a command: the actor must be in good standing and hold the role.
    fn authorize(
        &self,
        actor: &Identity,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<(Principal, Role), DomainError> {
        let mut principal = self.load_caller(actor)?;
        let evaluation = self.gate.evaluate(&mut principal, action, None, now);
        evaluation.decision.into_result()?;
        let role = evaluation.role.ok_or(DomainError::NoPrincipal)?;
        Ok((principal, role))
    }
}
