use serde::{Deserialize, Serialize};

use memberhub_core::DomainError;

use crate::principal::Principal;

/// Effective privilege level.
///
/// Variants are declared in lattice order, so `Ord` is the capability order:
/// `User < Support < Admin < SupremeAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Support,
    Admin,
    SupremeAdmin,
}

impl Role {
    /// Map the stored role field. Unknown or missing values are `User`.
    ///
    /// `SupremeAdmin` is never read from storage.
    pub fn from_stored(stored: Option<&str>) -> Self {
        match stored.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Role::Admin,
            Some("support") => Role::Support,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Support => "support",
            Role::Admin => "admin",
            Role::SupremeAdmin => "supreme_admin",
        }
    }

    pub fn has_capability(self, required: Role) -> bool {
        self >= required
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Does `role` carry at least the privileges of `capability`?
pub fn has_capability(role: Role, capability: Role) -> bool {
    role.has_capability(capability)
}

/// The two fixed operator identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorIdentities {
    supreme_admin_email: String,
    bootstrap_admin_email: Option<String>,
}

impl OperatorIdentities {
    pub fn new(
        supreme_admin_email: &str,
        bootstrap_admin_email: Option<&str>,
    ) -> Result<Self, DomainError> {
        let supreme = normalize_email(supreme_admin_email);
        if supreme.is_empty() {
            return Err(DomainError::invalid_configuration(
                "supreme-admin email must not be empty",
            ));
        }

        let bootstrap = bootstrap_admin_email
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        if bootstrap.as_deref() == Some(supreme.as_str()) {
            return Err(DomainError::invalid_configuration(
                "bootstrap-admin email must differ from supreme-admin email",
            ));
        }

        Ok(Self {
            supreme_admin_email: supreme,
            bootstrap_admin_email: bootstrap,
        })
    }

    pub fn is_supreme_admin(&self, email: &str) -> bool {
        normalize_email(email) == self.supreme_admin_email
    }

    pub fn is_bootstrap_admin(&self, email: &str) -> bool {
        self.bootstrap_admin_email.as_deref() == Some(normalize_email(email).as_str())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Maps principals to their effective [`Role`].
///
/// - No IO
/// - No panics
/// - Pure: identical inputs always give the same role
#[derive(Debug, Clone)]
pub struct RoleResolver {
    operators: OperatorIdentities,
}

impl RoleResolver {
    pub fn new(operators: OperatorIdentities) -> Self {
        Self { operators }
    }

    pub fn resolve(&self, principal: &Principal) -> Result<Role, DomainError> {
        if !principal.authenticated {
            return Err(DomainError::NoPrincipal);
        }
        if self.operators.is_supreme_admin(&principal.email) {
            return Ok(Role::SupremeAdmin);
        }
        if self.operators.is_bootstrap_admin(&principal.email) {
            return Ok(Role::Admin);
        }
        Ok(Role::from_stored(principal.stored_role.as_deref()))
    }

    /// Check a role-change command before it is written.
    ///
    /// The supreme-admin identity cannot be altered, `SupremeAdmin` cannot be
    /// assigned, and an actor cannot grant a role above its own.
    pub fn validate_role_change(
        &self,
        actor: Role,
        target: &Principal,
        new_role: Role,
    ) -> Result<(), DomainError> {
        if !actor.has_capability(Role::Admin) {
            return Err(DomainError::permission_denied(format!(
                "role change requires admin, caller is {actor}"
            )));
        }
        if self.operators.is_supreme_admin(&target.email) {
            return Err(DomainError::permission_denied(
                "the supreme-admin identity cannot be changed",
            ));
        }
        if new_role == Role::SupremeAdmin {
            return Err(DomainError::permission_denied(
                "supreme_admin cannot be assigned",
            ));
        }
        if new_role > actor {
            return Err(DomainError::permission_denied(format!(
                "{actor} cannot grant {new_role}"
            )));
        }
        Ok(())
    }
}
