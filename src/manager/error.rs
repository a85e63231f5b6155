//! Error types for the reconciliation loop

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Notification throttle errors
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Group handed to the throttle has no identifier
    #[error("Group has no identifier")]
    MissingIdentifier,

    /// Throttle records could not be read or cleaned up
    #[error("Throttle storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Server reconciliation errors
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Remote service call failed
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// Record could not be persisted
    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// Owner notification path failed
    #[error(transparent)]
    Throttle(#[from] ThrottleError),
}

impl ReconcileError {
    /// Storage failures are paced like a completed visit; everything else is
    /// retried almost immediately
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Throttle(ThrottleError::Storage(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_classification() {
        assert!(ReconcileError::Storage(anyhow::anyhow!("disk full")).is_storage());
        assert!(
            ReconcileError::Throttle(ThrottleError::Storage(anyhow::anyhow!("locked"))).is_storage()
        );
        assert!(!ReconcileError::Remote(RemoteError::Timeout).is_storage());
        assert!(!ReconcileError::Throttle(ThrottleError::MissingIdentifier).is_storage());
    }
}
