//! Bounded write-back for healed/imposed state.

use tracing::warn;

use crate::error::DomainError;

/// Result of a write attempted at most twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Persisted,
    PersistedOnRetry,
    Failed(DomainError),
}

impl RetryOutcome {
    pub fn into_result(self) -> Result<(), DomainError> {
        match self {
            RetryOutcome::Persisted | RetryOutcome::PersistedOnRetry => Ok(()),
            RetryOutcome::Failed(err) => Err(err),
        }
    }
}

/// Run `write`, retrying exactly once on failure.
///
/// Never blocks or sleeps between attempts. The second error is returned, not
/// swallowed; callers decide whether it fails the operation.
pub fn write_with_single_retry<F>(operation: &str, mut write: F) -> RetryOutcome
where
    F: FnMut() -> Result<(), DomainError>,
{
    match write() {
        Ok(()) => RetryOutcome::Persisted,
        Err(first) => {
            warn!(operation, error = %first, "write failed; retrying once");
            match write() {
                Ok(()) => RetryOutcome::PersistedOnRetry,
                Err(second) => RetryOutcome::Failed(second),
            }
        }
    }
}
