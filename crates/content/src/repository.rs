//! Storage contract for content nodes and manual grants.

use std::sync::Arc;

use memberhub_auth::StoreError;
use memberhub_core::{ContentNodeId, PrincipalId};

use crate::grant::ManualGrant;
use crate::node::ContentNode;

/// Content nodes and manual grants held by the hosted backend.
pub trait ContentRepository: Send + Sync {
    fn node(&self, id: ContentNodeId) -> Result<Option<ContentNode>, StoreError>;

    fn has_grant(&self, principal: PrincipalId, node: ContentNodeId) -> Result<bool, StoreError>;

    /// Insert-or-ignore. Returns `true` when the grant did not exist before.
    fn upsert_grant(&self, grant: ManualGrant) -> Result<bool, StoreError>;

    /// Returns `true` when a grant was removed.
    fn revoke_grant(&self, principal: PrincipalId, node: ContentNodeId) -> Result<bool, StoreError>;
}

impl<R> ContentRepository for Arc<R>
where
    R: ContentRepository + ?Sized,
{
    fn node(&self, id: ContentNodeId) -> Result<Option<ContentNode>, StoreError> {
        (**self).node(id)
    }

    fn has_grant(&self, principal: PrincipalId, node: ContentNodeId) -> Result<bool, StoreError> {
        (**self).has_grant(principal, node)
    }

    fn upsert_grant(&self, grant: ManualGrant) -> Result<bool, StoreError> {
        (**self).upsert_grant(grant)
    }

    fn revoke_grant(
        &self,
        principal: PrincipalId,
        node: ContentNodeId,
    ) -> Result<bool, StoreError> {
        (**self).revoke_grant(principal, node)
    }
}
