//! Store-specific error types and conversions.

use collabra_core::error::CollabError;

/// Storage-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row not found: {table} with id {id}")]
    RowNotFound { table: String, id: String },

    #[error("no open transaction to commit")]
    CommitWithoutTransaction,

    #[error("write attempted inside a read-only transaction")]
    ReadOnlyViolation,
}

impl From<StoreError> for CollabError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RowNotFound { table, id } => CollabError::NotFound { entity: table, id },
            other => CollabError::Storage(other.to_string()),
        }
    }
}
