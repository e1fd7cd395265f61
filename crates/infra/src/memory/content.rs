use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use memberhub_auth::StoreError;
use memberhub_content::{ContentNode, ContentRepository, ManualGrant};
use memberhub_core::{ContentNodeId, PrincipalId};

use super::FailureBudget;

/// In-memory content nodes and manual grants.
#[derive(Debug, Default)]
pub struct InMemoryContentRepository {
    nodes: RwLock<HashMap<ContentNodeId, ContentNode>>,
    grants: RwLock<HashMap<(PrincipalId, ContentNodeId), ManualGrant>>,
    failures: FailureBudget,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, node: ContentNode) {
        if let Ok(mut map) = self.nodes.write() {
            map.insert(node.id, node);
        }
    }

    pub fn remove_node(&self, id: ContentNodeId) {
        if let Ok(mut map) = self.nodes.write() {
            map.remove(&id);
        }
    }

    pub fn grant(&self, principal: PrincipalId, node: ContentNodeId) -> Option<ManualGrant> {
        self.grants.read().ok()?.get(&(principal, node)).cloned()
    }

    /// Make the next `n` grant writes fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.failures.set(n);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.failures.take() {
            Err(StoreError::Unavailable("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("content repository lock poisoned".to_string())
}

impl ContentRepository for InMemoryContentRepository {
    fn node(&self, id: ContentNodeId) -> Result<Option<ContentNode>, StoreError> {
        let map = self.nodes.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    fn has_grant(&self, principal: PrincipalId, node: ContentNodeId) -> Result<bool, StoreError> {
        let map = self.grants.read().map_err(|_| poisoned())?;
        Ok(map.contains_key(&(principal, node)))
    }

    fn upsert_grant(&self, grant: ManualGrant) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut map = self.grants.write().map_err(|_| poisoned())?;
        // Keep the original grant on duplicates.
        match map.entry((grant.principal_id, grant.node_id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(grant);
                Ok(true)
            }
        }
    }

    fn revoke_grant(
        &self,
        principal: PrincipalId,
        node: ContentNodeId,
    ) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut map = self.grants.write().map_err(|_| poisoned())?;
        Ok(map.remove(&(principal, node)).is_some())
    }
}
