use std::collections::HashMap;
use std::sync::RwLock;

use memberhub_auth::{SessionStore, StoreError};
use memberhub_core::PrincipalId;

use super::FailureBudget;

/// Counts open sessions per principal.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<PrincipalId, usize>>,
    failures: FailureBudget,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(&self, id: PrincipalId) {
        if let Ok(mut map) = self.sessions.write() {
            *map.entry(id).or_default() += 1;
        }
    }

    pub fn active_sessions(&self, id: PrincipalId) -> usize {
        self.sessions
            .read()
            .ok()
            .and_then(|map| map.get(&id).copied())
            .unwrap_or(0)
    }

    pub fn fail_next_invalidations(&self, n: usize) {
        self.failures.set(n);
    }
}

impl SessionStore for InMemorySessionStore {
    fn invalidate_sessions(&self, id: PrincipalId) -> Result<usize, StoreError> {
        if self.failures.take() {
            return Err(StoreError::Unavailable("injected session failure".to_string()));
        }
        let mut map = self
            .sessions
            .write()
            .map_err(|_| StoreError::Unavailable("session store lock poisoned".to_string()))?;
        Ok(map.remove(&id).unwrap_or(0))
    }
}
