//! Manual unlocks: explicit, non-expiring grants of one node to one principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use memberhub_auth::{Action, Role};
use memberhub_core::{ContentNodeId, DomainError, PrincipalId};

use crate::repository::ContentRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualGrant {
    pub principal_id: PrincipalId,
    pub node_id: ContentNodeId,
    pub granted_by: PrincipalId,
    pub granted_at: DateTime<Utc>,
}

fn require_unlock_capability(actor: Role) -> Result<(), DomainError> {
    let required = Action::ForceUnlockContent.required_role();
    if actor.has_capability(required) {
        Ok(())
    } else {
        Err(DomainError::permission_denied(format!(
            "manual unlocks require {required}, caller is {actor}"
        )))
    }
}

/// Record a manual unlock. Granting twice is not an error.
///
/// Returns `true` when a new grant was written.
pub fn grant_manual_unlock<R: ContentRepository>(
    repository: &R,
    actor: Role,
    grant: ManualGrant,
) -> Result<bool, DomainError> {
    require_unlock_capability(actor)?;
    if repository.node(grant.node_id)?.is_none() {
        return Err(DomainError::not_found());
    }

    let (principal_id, node_id) = (grant.principal_id, grant.node_id);
    let inserted = repository.upsert_grant(grant)?;
    info!(%principal_id, %node_id, inserted, "manual unlock granted");
    Ok(inserted)
}

/// Remove a manual unlock. Revoking a missing grant is not an error.
///
/// Returns `true` when a grant was removed.
pub fn revoke_manual_unlock<R: ContentRepository>(
    repository: &R,
    actor: Role,
    principal_id: PrincipalId,
    node_id: ContentNodeId,
) -> Result<bool, DomainError> {
    require_unlock_capability(actor)?;
    let removed = repository.revoke_grant(principal_id, node_id)?;
    info!(%principal_id, %node_id, removed, "manual unlock revoked");
    Ok(removed)
}
