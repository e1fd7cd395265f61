use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use memberhub_auth::{
    PlanChange, ProfileRecord, ProfileStore, PunitiveKind, PunitiveState, Role, StoreError,
};
use memberhub_core::PrincipalId;

use super::FailureBudget;

/// In-memory profile rows, stored in their loosely-typed backend shape.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    records: RwLock<HashMap<PrincipalId, ProfileRecord>>,
    failures: FailureBudget,
    writes: AtomicUsize,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ProfileRecord) {
        if let Ok(mut map) = self.records.write() {
            map.insert(record.id, record);
        }
    }

    pub fn get(&self, id: PrincipalId) -> Option<ProfileRecord> {
        self.records.read().ok()?.get(&id).cloned()
    }

    /// Make the next `n` writes fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.failures.set(n);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn update<F>(&self, id: PrincipalId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ProfileRecord),
    {
        if self.failures.take() {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        let mut map = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("profile store lock poisoned".to_string()))?;
        let record = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        apply(record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn load(&self, id: PrincipalId) -> Result<Option<ProfileRecord>, StoreError> {
        let map = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("profile store lock poisoned".to_string()))?;
        Ok(map.get(&id).cloned())
    }

    fn write_punitive(
        &self,
        id: PrincipalId,
        kind: PunitiveKind,
        state: &PunitiveState,
    ) -> Result<(), StoreError> {
        self.update(id, |record| record.set_punitive(kind, state))
    }

    fn write_role(&self, id: PrincipalId, role: Role) -> Result<(), StoreError> {
        self.update(id, |record| record.role = Some(role.as_str().to_string()))
    }

    fn write_plan(&self, id: PrincipalId, change: &PlanChange) -> Result<(), StoreError> {
        self.update(id, |record| {
            record.plan = change.plan.as_ref().map(|p| p.as_str().to_string());
            record.plan_expires_at = change.expires_at.map(|at| at.to_rfc3339());
            if let Some(activated) = change.activated_at {
                record.plan_activated_at = Some(activated.to_rfc3339());
            }
            record.plan_updated_at = Some(change.updated_at.to_rfc3339());
        })
    }
}
