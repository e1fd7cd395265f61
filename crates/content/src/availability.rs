//! Entitlement resolution for content nodes.
//!
//! Evaluation order, first match wins:
//!
//! 1. node not locked            → `Available`
//! 2. manual grant exists        → `Available`
//! 3. plan does not qualify      → `Locked(NoPlan)`
//! 4. drip delay is zero         → `Available`
//! 5. anchor + delay has passed  → `Available`, otherwise `PendingDays(n)`
//!
//! A missing anchor is `Locked(Indefinite)`. Integrity failures (a lesson whose
//! module does not exist, a corrupt plan or anchor timestamp the decision needs)
//! fail closed as `Locked(Unknown)`.

use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use memberhub_auth::{Plan, Principal, ProfileField};
use memberhub_core::{ContentNodeId, DomainError, days_rounded_up};

use crate::node::{ContentKind, ContentNode};
use crate::repository::ContentRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    /// The principal's plan does not unlock this content (prompt to upgrade).
    NoPlan,
    /// No anchor date exists to schedule the drip from.
    Indefinite,
    /// The decision could not be made safely.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum Availability {
    Available,
    Locked(LockReason),
    /// Whole days until the node opens, rounded up.
    PendingDays(u32),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl core::fmt::Display for Availability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Availability::Available => f.write_str("available"),
            Availability::Locked(LockReason::NoPlan) => {
                f.write_str("upgrade your plan to unlock this content")
            }
            Availability::Locked(LockReason::Indefinite) => {
                f.write_str("this content has not been scheduled for you yet")
            }
            Availability::Locked(LockReason::Unknown) => {
                f.write_str("this content is temporarily unavailable")
            }
            Availability::PendingDays(1) => f.write_str("unlocks in 1 day"),
            Availability::PendingDays(n) => write!(f, "unlocks in {n} days"),
        }
    }
}

/// Which principal timestamp drip delays are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// `plan_activated_at` for every node. Unaffected by later plan changes.
    #[default]
    PlanActivation,
    /// Modules use `plan_updated_at`, lessons use `first_access_at`.
    PerContentKind,
}

impl AnchorPolicy {
    /// Anchor for `node`, falling back to the account creation date.
    ///
    /// A corrupt anchor column is an integrity error, never a reason to fall back.
    pub fn anchor(
        &self,
        principal: &Principal,
        node: &ContentNode,
    ) -> Result<Option<DateTime<Utc>>, DomainError> {
        let field = match (self, node.kind) {
            (AnchorPolicy::PlanActivation, _) => ProfileField::PlanActivatedAt,
            (AnchorPolicy::PerContentKind, ContentKind::Module) => ProfileField::PlanUpdatedAt,
            (AnchorPolicy::PerContentKind, ContentKind::Lesson { .. }) => {
                ProfileField::FirstAccessAt
            }
        };
        match principal.timestamp(field)? {
            Some(anchor) => Ok(Some(anchor)),
            None => principal.timestamp(ProfileField::CreatedAt),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorPolicy::PlanActivation => "plan_activation",
            AnchorPolicy::PerContentKind => "per_content_kind",
        }
    }
}

impl FromStr for AnchorPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plan_activation" => Ok(AnchorPolicy::PlanActivation),
            "per_content_kind" => Ok(AnchorPolicy::PerContentKind),
            other => Err(DomainError::invalid_configuration(format!(
                "unknown anchor policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntitlementResolver {
    required_plan: Plan,
    anchor_policy: AnchorPolicy,
}

impl EntitlementResolver {
    pub fn new(required_plan: Plan, anchor_policy: AnchorPolicy) -> Self {
        Self {
            required_plan,
            anchor_policy,
        }
    }

    pub fn required_plan(&self) -> &Plan {
        &self.required_plan
    }

    pub fn anchor_policy(&self) -> AnchorPolicy {
        self.anchor_policy
    }

    /// The principal holds the required plan and it has not lapsed.
    pub fn plan_satisfied(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if principal.plan.as_ref() != Some(&self.required_plan) {
            return Ok(false);
        }
        let expires_at = principal.timestamp(ProfileField::PlanExpiresAt)?;
        Ok(expires_at.is_none_or(|expires| now < expires))
    }

    /// Evaluation of steps 1–5 for an already-validated node.
    ///
    /// Fails only when a profile timestamp the decision needs is corrupt; the
    /// unlocked and manual-grant paths never read one.
    pub fn try_evaluate(
        &self,
        principal: &Principal,
        node: &ContentNode,
        has_grant: bool,
        now: DateTime<Utc>,
    ) -> Result<Availability, DomainError> {
        if !node.locked || has_grant {
            return Ok(Availability::Available);
        }
        if !self.plan_satisfied(principal, now)? {
            return Ok(Availability::Locked(LockReason::NoPlan));
        }

        let delay_days = if node.drip_delay_days < 0 {
            warn!(
                node_id = %node.id,
                drip_delay_days = node.drip_delay_days,
                "negative drip delay treated as zero"
            );
            0
        } else {
            node.drip_delay_days
        };
        if delay_days == 0 {
            return Ok(Availability::Available);
        }

        Ok(match self.anchor_policy.anchor(principal, node)? {
            Some(anchor) => drip_status(anchor, delay_days, now),
            None => Availability::Locked(LockReason::Indefinite),
        })
    }

    /// Total variant of [`Self::try_evaluate`].
    pub fn evaluate(
        &self,
        principal: &Principal,
        node: &ContentNode,
        has_grant: bool,
        now: DateTime<Utc>,
    ) -> Availability {
        self.try_evaluate(principal, node, has_grant, now)
            .unwrap_or_else(|err| fail_closed(principal, node.id, &err))
    }

    /// Load the node and its grant, validate references, then evaluate.
    pub fn try_resolve<R: ContentRepository>(
        &self,
        repository: &R,
        principal: &Principal,
        node_id: ContentNodeId,
        now: DateTime<Utc>,
    ) -> Result<Availability, DomainError> {
        let node = repository.node(node_id)?.ok_or_else(DomainError::not_found)?;

        if let Some(module_id) = node.parent() {
            match repository.node(module_id)? {
                Some(module) if module.is_module() => {}
                Some(_) => {
                    return Err(DomainError::data_integrity(format!(
                        "lesson {node_id} has parent {module_id} which is not a module"
                    )));
                }
                None => {
                    return Err(DomainError::data_integrity(format!(
                        "lesson {node_id} references missing module {module_id}"
                    )));
                }
            }
        }

        let has_grant = repository.has_grant(principal.id, node_id)?;
        self.try_evaluate(principal, &node, has_grant, now)
    }

    /// Total variant of [`Self::try_resolve`]: any failure is logged and fails closed.
    pub fn resolve<R: ContentRepository>(
        &self,
        repository: &R,
        principal: &Principal,
        node_id: ContentNodeId,
        now: DateTime<Utc>,
    ) -> Availability {
        self.try_resolve(repository, principal, node_id, now)
            .unwrap_or_else(|err| fail_closed(principal, node_id, &err))
    }
}

fn fail_closed(principal: &Principal, node_id: ContentNodeId, err: &DomainError) -> Availability {
    error!(
        principal_id = %principal.id,
        %node_id,
        error = %err,
        "entitlement resolution failed; locking"
    );
    Availability::Locked(LockReason::Unknown)
}

fn drip_status(anchor: DateTime<Utc>, delay_days: i64, now: DateTime<Utc>) -> Availability {
    let Some(unlock_at) = Duration::try_days(delay_days).and_then(|d| anchor.checked_add_signed(d))
    else {
        warn!(delay_days, "drip delay out of range; content stays locked");
        return Availability::Locked(LockReason::Indefinite);
    };

    if now >= unlock_at {
        return Availability::Available;
    }
    let days = days_rounded_up(unlock_at - now);
    Availability::PendingDays(u32::try_from(days).unwrap_or(u32::MAX))
}
