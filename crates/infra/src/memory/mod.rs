//! In-memory collaborator implementations for tests/dev.
//!
//! Each store can be told to fail its next writes so persistence-failure paths
//! can be exercised deterministically.

pub mod content;
pub mod profiles;
pub mod sessions;

pub use content::InMemoryContentRepository;
pub use profiles::InMemoryProfileStore;
pub use sessions::InMemorySessionStore;

use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown of writes that should fail.
#[derive(Debug, Default)]
pub(crate) struct FailureBudget(AtomicUsize);

impl FailureBudget {
    pub(crate) fn set(&self, n: usize) {
        self.0.store(n, Ordering::SeqCst);
    }

    /// Consume one failure if any are left.
    pub(crate) fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}
