//! Saga runtime error types.

use common::SagaId;
use saga_store::SagaStoreError;
use thiserror::Error;

/// Errors that can occur while routing events to sagas.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga has no record and is not live in this process.
    ///
    /// Often expected: an association lookup may race a concurrent
    /// delete, in which case callers skip the vanished instance.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// The saga is currently held by another caller and the caller
    /// chose not to wait.
    #[error("Saga already claimed: {0}")]
    AlreadyClaimed(SagaId),

    /// The saga's domain state could not be encoded or decoded.
    ///
    /// Fatal to the single commit or load; never corrupts the
    /// repository's hold bookkeeping.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend reported a failure.
    #[error("Saga store error: {0}")]
    Store(#[from] SagaStoreError),

    /// The saga's event handler rejected the event.
    #[error("Saga {saga_id} handler failed: {reason}")]
    Handler { saga_id: SagaId, reason: String },
}

/// Convenience type alias for saga runtime results.
pub type Result<T> = std::result::Result<T, SagaError>;
