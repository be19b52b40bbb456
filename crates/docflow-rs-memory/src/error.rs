//! Error types for memory operations.

use crate::model::EntryId;

/// Errors returned by memory backends and the shared memory facade.
///
/// An unknown identifier is not an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Entry failed validation (empty source or type).
    #[error("invalid entry: {0}")]
    InvalidEntry(String),
    /// The backing medium could not be reached, read or written.
    #[error("{backend} storage unavailable: {message}")]
    StorageUnavailable {
        backend: &'static str,
        message: String,
    },
    /// A stored payload could not be parsed back into an entry.
    #[error("failed to deserialize entry {id}: {message}")]
    DeserializationFailure { id: EntryId, message: String },
    /// Backend name does not match any known backend.
    #[error("unknown backend type: {0}")]
    UnknownBackend(String),
}

impl MemoryError {
    pub(crate) fn unavailable(backend: &'static str, err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            backend,
            message: err.to_string(),
        }
    }

    pub(crate) fn corrupt(id: &EntryId, err: impl std::fmt::Display) -> Self {
        Self::DeserializationFailure {
            id: id.clone(),
            message: err.to_string(),
        }
    }
}
