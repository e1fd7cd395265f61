//! Engine configuration.
//!
//! Loads configuration from environment variables.

use std::env;

use anyhow::{Context, Result};

use memberhub_auth::{OperatorIdentities, Plan, RoleResolver};
use memberhub_content::{AnchorPolicy, EntitlementResolver};
use memberhub_core::DomainError;

pub const SUPREME_ADMIN_EMAIL: &str = "MEMBERHUB_SUPREME_ADMIN_EMAIL";
pub const BOOTSTRAP_ADMIN_EMAIL: &str = "MEMBERHUB_BOOTSTRAP_ADMIN_EMAIL";
pub const REQUIRED_PLAN: &str = "MEMBERHUB_REQUIRED_PLAN";
pub const ANCHOR_POLICY: &str = "MEMBERHUB_ANCHOR_POLICY";

const DEFAULT_REQUIRED_PLAN: &str = "diamond";

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed supreme-admin operator identity
    pub supreme_admin_email: String,

    /// Fixed bootstrap-admin identity (optional)
    pub bootstrap_admin_email: Option<String>,

    /// Plan that unlocks locked content (default: "diamond")
    pub required_plan: Plan,

    /// Drip anchor selection (default: plan activation)
    pub anchor_policy: AnchorPolicy,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            supreme_admin_email: lookup(SUPREME_ADMIN_EMAIL)
                .with_context(|| format!("{SUPREME_ADMIN_EMAIL} must be set"))?,
            bootstrap_admin_email: lookup(BOOTSTRAP_ADMIN_EMAIL).filter(|v| !v.trim().is_empty()),
            required_plan: lookup(REQUIRED_PLAN)
                .as_deref()
                .and_then(Plan::parse)
                .unwrap_or_else(|| Plan::new(DEFAULT_REQUIRED_PLAN)),
            anchor_policy: match lookup(ANCHOR_POLICY).filter(|v| !v.trim().is_empty()) {
                Some(raw) => raw
                    .parse::<AnchorPolicy>()
                    .with_context(|| format!("{ANCHOR_POLICY} is invalid"))?,
                None => AnchorPolicy::default(),
            },
        };

        config
            .operators()
            .context("operator identities are invalid")?;
        Ok(config)
    }

    pub fn operators(&self) -> Result<OperatorIdentities, DomainError> {
        OperatorIdentities::new(
            &self.supreme_admin_email,
            self.bootstrap_admin_email.as_deref(),
        )
    }

    pub fn role_resolver(&self) -> Result<RoleResolver, DomainError> {
        Ok(RoleResolver::new(self.operators()?))
    }

    pub fn entitlement_resolver(&self) -> EntitlementResolver {
        EntitlementResolver::new(self.required_plan.clone(), self.anchor_policy)
    }
}
