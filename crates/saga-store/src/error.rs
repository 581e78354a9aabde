use common::SagaId;
use thiserror::Error;

/// Errors that can occur when interacting with a saga store.
#[derive(Debug, Error)]
pub enum SagaStoreError {
    /// An insert targeted an identifier that already has a record.
    ///
    /// Under the manager's creation policy this signals a caller bug or
    /// a race the backend refused; it is fatal to the operation.
    #[error("Duplicate saga identifier: {0}")]
    DuplicateIdentifier(SagaId),

    /// An update targeted an identifier with no record.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend could not be reached or failed mid-call.
    ///
    /// The core never retries; retry policy belongs to the caller.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, SagaStoreError>;
