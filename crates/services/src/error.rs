//! Shared error types for the services crate.

use thiserror::Error;

use storage::StorageError;
use usage_core::model::{UsageInputError, UsageRecord};

/// Errors emitted by `UsageLedger`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The stored blob exists but is not a valid record sequence.
    #[error("persisted usage history under {key:?} is malformed: {source}")]
    MalformedPersistedData {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The record was computed but the store rejected the write.
    #[error("failed to persist usage record: {source}")]
    PersistenceWriteFailure {
        record: Box<UsageRecord>,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    InvalidUsageInput(#[from] UsageInputError),
    #[error("failed to encode usage history: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// The record computed for a call whose history write failed.
    #[must_use]
    pub fn unsaved_record(&self) -> Option<&UsageRecord> {
        match self {
            Self::PersistenceWriteFailure { record, .. } => Some(record),
            _ => None,
        }
    }
}
