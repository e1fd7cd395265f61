use chrono::{DateTime, Utc};
use serde::Serialize;

use memberhub_core::{DomainError, PrincipalId};

use crate::moderation::{
    Expiry, HealReport, ModerationStateMachine, PunitiveKind, PunitiveState, WriteBack,
};
use crate::principal::Principal;
use crate::roles::{Role, RoleResolver};
use crate::store::ProfileStore;

/// Actions gated by [`AccessGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreatePost,
    CreateComment,
    SendChatMessage,
    ImposeBan,
    LiftBan,
    ImposeMute,
    LiftMute,
    DeleteAnyPost,
    DeleteAnyComment,
    ChangeRole,
    ChangePlan,
    ChangePoints,
    ForceUnlockContent,
    EditOwnProfile,
    DeleteOwnPost,
}

/// How an action is authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    /// Requires an unmuted, unbanned principal. No role bypasses either.
    Authoring,
    /// Requires at least the given role.
    Moderation { required: Role },
    /// Requires ownership of the resource, or at least the given role.
    SelfScoped { override_role: Role },
}

impl Action {
    pub fn impose(kind: PunitiveKind) -> Self {
        match kind {
            PunitiveKind::Ban => Action::ImposeBan,
            PunitiveKind::Mute => Action::ImposeMute,
        }
    }

    pub fn lift(kind: PunitiveKind) -> Self {
        match kind {
            PunitiveKind::Ban => Action::LiftBan,
            PunitiveKind::Mute => Action::LiftMute,
        }
    }

    /// The fixed capability table.
    pub fn class(self) -> ActionClass {
        use Action::*;
        match self {
            CreatePost | CreateComment | SendChatMessage => ActionClass::Authoring,
            DeleteAnyPost | DeleteAnyComment => ActionClass::Moderation {
                required: Role::Support,
            },
            ImposeBan | LiftBan | ImposeMute | LiftMute | ChangeRole | ChangePlan
            | ChangePoints | ForceUnlockContent => ActionClass::Moderation {
                required: Role::Admin,
            },
            EditOwnProfile | DeleteOwnPost => ActionClass::SelfScoped {
                override_role: Role::Support,
            },
        }
    }

    /// Lowest role that can perform the action on any resource.
    pub fn required_role(self) -> Role {
        match self.class() {
            ActionClass::Authoring => Role::User,
            ActionClass::Moderation { required } => required,
            ActionClass::SelfScoped { override_role } => override_role,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreatePost => "create_post",
            Action::CreateComment => "create_comment",
            Action::SendChatMessage => "send_chat_message",
            Action::ImposeBan => "impose_ban",
            Action::LiftBan => "lift_ban",
            Action::ImposeMute => "impose_mute",
            Action::LiftMute => "lift_mute",
            Action::DeleteAnyPost => "delete_any_post",
            Action::DeleteAnyComment => "delete_any_comment",
            Action::ChangeRole => "change_role",
            Action::ChangePlan => "change_plan",
            Action::ChangePoints => "change_points",
            Action::ForceUnlockContent => "force_unlock_content",
            Action::EditOwnProfile => "edit_own_profile",
            Action::DeleteOwnPost => "delete_own_post",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a banned or muted principal is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PunitiveNotice {
    pub until: Expiry,
    /// Rounded up; `None` for permanent.
    pub remaining_days: Option<i64>,
}

impl PunitiveNotice {
    fn from_state(state: &PunitiveState, now: DateTime<Utc>) -> Option<Self> {
        match state {
            PunitiveState::Clear => None,
            PunitiveState::Active(until) => Some(Self {
                until: *until,
                remaining_days: state.remaining_days(now),
            }),
        }
    }
}

impl core::fmt::Display for PunitiveNotice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.remaining_days {
            None => f.write_str("permanently"),
            Some(1) => f.write_str("for 1 more day"),
            Some(n) => write!(f, "for {n} more days"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DenialReason {
    NoPrincipal,
    Banned(PunitiveNotice),
    Muted(PunitiveNotice),
    InsufficientRole { required: Role, actual: Role },
    NotOwner,
}

impl core::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DenialReason::NoPrincipal => f.write_str("sign in to continue"),
            DenialReason::Banned(notice) => write!(f, "your account is banned {notice}"),
            DenialReason::Muted(notice) => write!(f, "you are muted {notice}"),
            DenialReason::InsufficientRole { required, .. } => {
                write!(f, "this action requires the {required} role")
            }
            DenialReason::NotOwner => f.write_str("you can only do this to your own content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum AccessDecision {
    Authorized,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AccessDecision::Authorized)
    }

    /// Map to the error taxonomy for command handlers.
    pub fn into_result(self) -> Result<(), DomainError> {
        match self {
            AccessDecision::Authorized => Ok(()),
            AccessDecision::Denied(DenialReason::NoPrincipal) => Err(DomainError::NoPrincipal),
            AccessDecision::Denied(reason) => {
                Err(DomainError::permission_denied(reason.to_string()))
            }
        }
    }
}

/// Everything the gate looked at for one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvaluation {
    pub action: Action,
    pub role: Option<Role>,
    pub ban: Option<HealReport>,
    pub mute: Option<HealReport>,
    pub decision: AccessDecision,
}

/// Detailed, serialisable account of an access decision (support console).
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub action: Action,
    pub granted: bool,
    pub reason: String,
    pub role: Option<Role>,
    pub required_role: Role,
    pub ban: Option<PunitiveState>,
    pub mute: Option<PunitiveState>,
    /// Heal write-backs that failed during this evaluation.
    pub persistence_failures: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Authorizes actions from role and healed account standing.
///
/// Always heals both ban and mute before deciding, so an expiry that passed a
/// moment ago is honoured even if the healed record could not be written.
#[derive(Debug, Clone)]
pub struct AccessGate<S> {
    resolver: RoleResolver,
    moderation: ModerationStateMachine<S>,
}

impl<S> AccessGate<S>
where
    S: ProfileStore,
{
    pub fn new(resolver: RoleResolver, moderation: ModerationStateMachine<S>) -> Self {
        Self {
            resolver,
            moderation,
        }
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn moderation(&self) -> &ModerationStateMachine<S> {
        &self.moderation
    }

    pub fn check_access(
        &self,
        principal: &mut Principal,
        action: Action,
        resource_owner: Option<PrincipalId>,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        self.evaluate(principal, action, resource_owner, now).decision
    }

    pub fn evaluate(
        &self,
        principal: &mut Principal,
        action: Action,
        resource_owner: Option<PrincipalId>,
        now: DateTime<Utc>,
    ) -> AccessEvaluation {
        let role = match self.resolver.resolve(principal) {
            Ok(role) => role,
            Err(_) => {
                return AccessEvaluation {
                    action,
                    role: None,
                    ban: None,
                    mute: None,
                    decision: AccessDecision::Denied(DenialReason::NoPrincipal),
                };
            }
        };

        let ban = self.moderation.check_and_heal(PunitiveKind::Ban, principal, now);
        let mute = self.moderation.check_and_heal(PunitiveKind::Mute, principal, now);

        let decision = decide(
            principal.id,
            role,
            &ban.state,
            &mute.state,
            action,
            resource_owner,
            now,
        );

        AccessEvaluation {
            action,
            role: Some(role),
            ban: Some(ban),
            mute: Some(mute),
            decision,
        }
    }

    pub fn explain(
        &self,
        principal: &mut Principal,
        action: Action,
        resource_owner: Option<PrincipalId>,
        now: DateTime<Utc>,
    ) -> AccessExplanation {
        let evaluation = self.evaluate(principal, action, resource_owner, now);
        let required_role = action.required_role();

        let persistence_failures = [&evaluation.ban, &evaluation.mute]
            .into_iter()
            .flatten()
            .filter_map(|report| match &report.write_back {
                WriteBack::Failed(err) => Some(format!("{}: {err}", report.kind)),
                _ => None,
            })
            .collect();

        let (reason, suggestions) = match &evaluation.decision {
            AccessDecision::Authorized => (
                match (action.class(), evaluation.role) {
                    (ActionClass::Authoring, _) => "principal is in good standing".to_string(),
                    (_, Some(role)) if role.has_capability(required_role) => {
                        format!("role {role} meets required role {required_role}")
                    }
                    _ => "principal owns the resource".to_string(),
                },
                Vec::new(),
            ),
            AccessDecision::Denied(denial) => (denial.to_string(), suggestions_for(denial)),
        };

        AccessExplanation {
            action,
            granted: evaluation.decision.is_authorized(),
            reason,
            role: evaluation.role,
            required_role,
            ban: evaluation.ban.map(|r| r.state),
            mute: evaluation.mute.map(|r| r.state),
            persistence_failures,
            suggestions,
        }
    }
}

/// Pure decision over already-healed state.
fn decide(
    principal_id: PrincipalId,
    role: Role,
    ban: &PunitiveState,
    mute: &PunitiveState,
    action: Action,
    resource_owner: Option<PrincipalId>,
    now: DateTime<Utc>,
) -> AccessDecision {
    // A ban blocks everything, whatever the role.
    if let Some(notice) = PunitiveNotice::from_state(ban, now) {
        return AccessDecision::Denied(DenialReason::Banned(notice));
    }

    match action.class() {
        ActionClass::Authoring => match PunitiveNotice::from_state(mute, now) {
            Some(notice) => AccessDecision::Denied(DenialReason::Muted(notice)),
            None => AccessDecision::Authorized,
        },
        ActionClass::Moderation { required } => {
            if role.has_capability(required) {
                AccessDecision::Authorized
            } else {
                AccessDecision::Denied(DenialReason::InsufficientRole {
                    required,
                    actual: role,
                })
            }
        }
        ActionClass::SelfScoped { override_role } => {
            if resource_owner == Some(principal_id) || role.has_capability(override_role) {
                AccessDecision::Authorized
            } else {
                AccessDecision::Denied(DenialReason::NotOwner)
            }
        }
    }
}

fn suggestions_for(denial: &DenialReason) -> Vec<String> {
    match denial {
        DenialReason::NoPrincipal => vec!["Sign in and retry the request".to_string()],
        DenialReason::Banned(notice) => match notice.until {
            Expiry::Permanent => vec!["Only an admin can lift a permanent ban".to_string()],
            Expiry::At(at) => vec![
                format!("The ban expires at {}", at.to_rfc3339()),
                "An admin can lift the ban early".to_string(),
            ],
        },
        DenialReason::Muted(notice) => match notice.until {
            Expiry::Permanent => vec!["Only an admin can lift a permanent mute".to_string()],
            Expiry::At(at) => vec![
                format!("The mute expires at {}", at.to_rfc3339()),
                "Moderation commands remain available while muted".to_string(),
            ],
        },
        DenialReason::InsufficientRole { required, actual } => vec![format!(
            "Ask an admin to raise the role from {actual} to at least {required}"
        )],
        DenialReason::NotOwner => vec![
            "Act on a resource you own".to_string(),
            "Support staff can act on other members' resources".to_string(),
        ],
    }
}
