use crate::kv::FakeKeyValue;
use docflow_rs_memory::{
    EntryId, InMemoryBackend, KeyValueBackend, MemoryBackend, MemoryEntry, MemoryError,
    SearchCriteria, SqliteBackend,
};
use std::sync::Arc;

/// One fresh instance of every bundled backend, Redis replaced by
/// [`FakeKeyValue`].
pub fn backend_matrix() -> Vec<Arc<dyn MemoryBackend>> {
    vec![
        Arc::new(SqliteBackend::open_in_memory().expect("sqlite backend")),
        Arc::new(KeyValueBackend::new(FakeKeyValue::new())),
        Arc::new(InMemoryBackend::new()),
    ]
}

/// Backend whose storage medium is always down.
#[derive(Debug, Default)]
pub struct FailingBackend;

impl FailingBackend {
    fn down() -> MemoryError {
        MemoryError::StorageUnavailable {
            backend: "failing",
            message: "disk unavailable".to_string(),
        }
    }
}

impl MemoryBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn store(&self, _entry: &MemoryEntry) -> Result<EntryId, MemoryError> {
        Err(Self::down())
    }

    fn retrieve(&self, _id: &EntryId) -> Result<Option<MemoryEntry>, MemoryError> {
        Err(Self::down())
    }

    fn search(&self, _criteria: &SearchCriteria) -> Result<Vec<MemoryEntry>, MemoryError> {
        Err(Self::down())
    }
}
