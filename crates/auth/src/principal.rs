use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use memberhub_core::{DomainError, PrincipalId};

use crate::moderation::{Expiry, PunitiveKind, PunitiveState};

/// Subscription plan identifier (e.g. "diamond", "free").
///
/// Plans are opaque strings at this layer; which plan unlocks locked content is
/// decided by configuration, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(Cow<'static, str>);

impl Plan {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Normalise a backend-supplied plan name (trimmed, lowercase).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(Cow::Owned(trimmed.to_lowercase())))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Plan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller identity as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub id: Option<PrincipalId>,
    pub email: Option<String>,
    pub authenticated: bool,
}

impl Identity {
    pub fn authenticated(id: PrincipalId, email: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            email: Some(email.into()),
            authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The principal id, if the caller is actually signed in.
    pub fn principal_id(&self) -> Result<PrincipalId, DomainError> {
        match (self.authenticated, self.id) {
            (true, Some(id)) => Ok(id),
            _ => Err(DomainError::NoPrincipal),
        }
    }
}

/// A validated principal, ready for role, standing and entitlement decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub authenticated: bool,
    /// Raw role field from the profile; mapped by [`crate::RoleResolver`].
    pub stored_role: Option<String>,
    pub plan: Option<Plan>,
    pub plan_expires_at: Option<DateTime<Utc>>,
    /// Set once, when the principal first obtains a plan.
    pub plan_activated_at: Option<DateTime<Utc>>,
    /// Rewritten on every plan change.
    pub plan_updated_at: Option<DateTime<Utc>>,
    pub first_access_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub ban: PunitiveState,
    pub mute: PunitiveState,
    /// Plan and anchor columns that failed to parse. The matching field above
    /// is `None`; decisions that need it must consult [`Principal::timestamp`].
    pub corrupt_fields: Vec<CorruptField>,
}

/// Non-punitive profile timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    PlanExpiresAt,
    PlanActivatedAt,
    PlanUpdatedAt,
    FirstAccessAt,
    CreatedAt,
}

impl ProfileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::PlanExpiresAt => "plan_expires_at",
            ProfileField::PlanActivatedAt => "plan_activated_at",
            ProfileField::PlanUpdatedAt => "plan_updated_at",
            ProfileField::FirstAccessAt => "first_access_at",
            ProfileField::CreatedAt => "created_at",
        }
    }
}

impl core::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored timestamp that could not be parsed, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptField {
    pub field: ProfileField,
    pub raw: String,
    pub error: String,
}

impl Principal {
    /// A signed-in principal with no plan, role or punitive state.
    pub fn new(id: PrincipalId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            authenticated: true,
            stored_role: None,
            plan: None,
            plan_expires_at: None,
            plan_activated_at: None,
            plan_updated_at: None,
            first_access_at: None,
            created_at: None,
            ban: PunitiveState::Clear,
            mute: PunitiveState::Clear,
            corrupt_fields: Vec::new(),
        }
    }

    /// A plan or anchor timestamp, or `DataIntegrity` if the stored value was corrupt.
    pub fn timestamp(&self, field: ProfileField) -> Result<Option<DateTime<Utc>>, DomainError> {
        if let Some(corrupt) = self.corrupt_fields.iter().find(|c| c.field == field) {
            return Err(DomainError::data_integrity(format!(
                "{}: '{}': {}",
                corrupt.field, corrupt.raw, corrupt.error
            )));
        }
        Ok(match field {
            ProfileField::PlanExpiresAt => self.plan_expires_at,
            ProfileField::PlanActivatedAt => self.plan_activated_at,
            ProfileField::PlanUpdatedAt => self.plan_updated_at,
            ProfileField::FirstAccessAt => self.first_access_at,
            ProfileField::CreatedAt => self.created_at,
        })
    }

    pub fn punitive(&self, kind: PunitiveKind) -> &PunitiveState {
        match kind {
            PunitiveKind::Ban => &self.ban,
            PunitiveKind::Mute => &self.mute,
        }
    }

    pub fn set_punitive(&mut self, kind: PunitiveKind, state: PunitiveState) {
        match kind {
            PunitiveKind::Ban => self.ban = state,
            PunitiveKind::Mute => self.mute = state,
        }
    }
}

/// Profile row as the hosted backend stores it.
///
/// Every field except `id` and `email` may be missing, and timestamps arrive as
/// RFC 3339 strings. [`ProfileRecord::into_principal`] is the only way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: PrincipalId,
    pub email: String,
    pub role: Option<String>,
    pub plan: Option<String>,
    pub plan_expires_at: Option<String>,
    pub plan_activated_at: Option<String>,
    pub plan_updated_at: Option<String>,
    pub first_access_at: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
    pub banned_until: Option<String>,
    #[serde(default)]
    pub is_muted: bool,
    pub muted_until: Option<String>,
}

impl ProfileRecord {
    pub fn new(id: PrincipalId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            role: None,
            plan: None,
            plan_expires_at: None,
            plan_activated_at: None,
            plan_updated_at: None,
            first_access_at: None,
            created_at: None,
            is_banned: false,
            banned_until: None,
            is_muted: false,
            muted_until: None,
        }
    }

    /// Validate the record into a [`Principal`] for the given caller identity.
    ///
    /// The identity provider's email wins over the stored copy. Corrupt ban/mute
    /// columns reject the whole record; corrupt plan and anchor timestamps are
    /// recorded on the principal so only decisions that read them fail.
    pub fn into_principal(self, identity: &Identity) -> Result<Principal, DomainError> {
        if let Some(id) = identity.id {
            if id != self.id {
                return Err(DomainError::data_integrity(format!(
                    "profile {} returned for identity {}",
                    self.id, id
                )));
            }
        }

        let ban = punitive_from_record(
            PunitiveKind::Ban,
            self.is_banned,
            self.banned_until.as_deref(),
        )?;
        let mute = punitive_from_record(
            PunitiveKind::Mute,
            self.is_muted,
            self.muted_until.as_deref(),
        )?;

        let principal_id = self.id;
        let mut corrupt_fields = Vec::new();
        let mut lenient = |field: ProfileField, raw: Option<String>| {
            let raw = raw?;
            match parse_rfc3339(&raw) {
                Ok(at) => at,
                Err(error) => {
                    warn!(
                        %principal_id,
                        %field,
                        raw = %raw,
                        "unparsable profile timestamp"
                    );
                    corrupt_fields.push(CorruptField {
                        field,
                        raw,
                        error: error.to_string(),
                    });
                    None
                }
            }
        };
        let plan_expires_at = lenient(ProfileField::PlanExpiresAt, self.plan_expires_at);
        let plan_activated_at = lenient(ProfileField::PlanActivatedAt, self.plan_activated_at);
        let plan_updated_at = lenient(ProfileField::PlanUpdatedAt, self.plan_updated_at);
        let first_access_at = lenient(ProfileField::FirstAccessAt, self.first_access_at);
        let created_at = lenient(ProfileField::CreatedAt, self.created_at);

        Ok(Principal {
            id: self.id,
            email: identity.email.clone().unwrap_or(self.email),
            authenticated: identity.authenticated,
            stored_role: self.role,
            plan: self.plan.as_deref().and_then(Plan::parse),
            plan_expires_at,
            plan_activated_at,
            plan_updated_at,
            first_access_at,
            created_at,
            ban,
            mute,
            corrupt_fields,
        })
    }

    /// Write a punitive state back into the loosely-typed columns.
    pub fn set_punitive(&mut self, kind: PunitiveKind, state: &PunitiveState) {
        let (flag, until) = match state {
            PunitiveState::Clear => (false, None),
            PunitiveState::Active(Expiry::Permanent) => (true, None),
            PunitiveState::Active(Expiry::At(at)) => (true, Some(at.to_rfc3339())),
        };
        match kind {
            PunitiveKind::Ban => {
                self.is_banned = flag;
                self.banned_until = until;
            }
            PunitiveKind::Mute => {
                self.is_muted = flag;
                self.muted_until = until;
            }
        }
    }
}

fn punitive_from_record(
    kind: PunitiveKind,
    flag: bool,
    until: Option<&str>,
) -> Result<PunitiveState, DomainError> {
    if !flag {
        // A leftover expiry after a lift is common and harmless.
        return Ok(PunitiveState::Clear);
    }
    let field = match kind {
        PunitiveKind::Ban => "banned_until",
        PunitiveKind::Mute => "muted_until",
    };
    Ok(match parse_timestamp(field, until)? {
        Some(at) => PunitiveState::Active(Expiry::At(at)),
        None => PunitiveState::Active(Expiry::Permanent),
    })
}

fn parse_timestamp(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, DomainError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    parse_rfc3339(raw).map_err(|e| DomainError::data_integrity(format!("{field}: '{raw}': {e}")))
}

/// Blank strings count as missing.
fn parse_rfc3339(raw: &str) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw).map(|dt| Some(dt.with_timezone(&Utc)))
}
