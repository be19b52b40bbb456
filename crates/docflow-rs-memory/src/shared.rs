//! Shared memory facade: one entry point over a selected backend.

use crate::backend::in_memory::InMemoryBackend;
use crate::backend::redis_client::{DEFAULT_REDIS_URL, RedisBackend};
use crate::backend::sqlite::SqliteBackend;
use crate::backend::{BackendKind, MemoryBackend};
use crate::clock::{Clock, SystemClock};
use crate::criteria::{SearchCriteria, SearchOutcome};
use crate::error::MemoryError;
use crate::model::{EntryId, ExtractedValues, MemoryEntry};
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Fields for one store call, for callers preferring named setters.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    source: String,
    kind: String,
    extracted_values: Option<ExtractedValues>,
    thread_id: Option<String>,
    conversation_id: Option<String>,
}

impl StoreRequest {
    pub fn new(source: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            extracted_values: None,
            thread_id: None,
            conversation_id: None,
        }
    }

    pub fn extracted_values(mut self, values: ExtractedValues) -> Self {
        self.extracted_values = Some(values);
        self
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Single entry point used by pipeline components.
///
/// Holds only the backend and the clock that stamps new entries; every call
/// is forwarded, nothing is cached.
#[derive(Clone)]
pub struct SharedMemory {
    backend: Arc<dyn MemoryBackend>,
    clock: Arc<dyn Clock>,
}

impl SharedMemory {
    /// Wrap a backend, stamping entries with the system clock.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn MemoryBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Build a backend of `kind` with default settings: a private in-memory
    /// SQLite database, a local Redis, or a process-local map.
    pub fn from_kind(kind: BackendKind) -> Result<Self, MemoryError> {
        let backend: Arc<dyn MemoryBackend> = match kind {
            BackendKind::Sqlite => Arc::new(SqliteBackend::open_in_memory()?),
            BackendKind::Redis => Arc::new(RedisBackend::connect(DEFAULT_REDIS_URL)?),
            BackendKind::Memory => Arc::new(InMemoryBackend::new()),
        };
        Ok(Self::new(backend))
    }

    /// Like [`SharedMemory::from_kind`], selecting the backend by name.
    pub fn from_name(name: &str) -> Result<Self, MemoryError> {
        Self::from_kind(name.parse()?)
    }

    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.backend
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Record one processing step and return its identifier.
    ///
    /// The timestamp comes from this facade's clock. Identifiers derive from
    /// source and timestamp, so a second store from the same source within
    /// the same microsecond replaces the first.
    pub fn store(
        &self,
        source: &str,
        kind: &str,
        extracted_values: Option<ExtractedValues>,
        thread_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Result<EntryId, MemoryError> {
        let mut request = StoreRequest::new(source, kind);
        request.extracted_values = extracted_values;
        request.thread_id = thread_id.map(str::to_string);
        request.conversation_id = conversation_id.map(str::to_string);
        self.store_request(request)
    }

    pub fn store_request(&self, request: StoreRequest) -> Result<EntryId, MemoryError> {
        let mut draft = MemoryEntry::draft(request.source, request.kind)
            .extracted_values(request.extracted_values.unwrap_or_default());
        if let Some(thread_id) = request.thread_id {
            draft = draft.thread_id(thread_id);
        }
        if let Some(conversation_id) = request.conversation_id {
            draft = draft.conversation_id(conversation_id);
        }
        let entry = draft.stamp(self.clock.as_ref())?;
        let id = self.backend.store(&entry)?;
        debug!(
            "memory entry recorded (backend={}, id={id}, type={})",
            self.backend.name(),
            entry.kind()
        );
        Ok(id)
    }

    pub fn retrieve(&self, id: &EntryId) -> Result<Option<MemoryEntry>, MemoryError> {
        self.backend.retrieve(id)
    }

    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<MemoryEntry>, MemoryError> {
        self.backend.search(criteria)
    }

    /// Search that reports, rather than fails on, unreadable entries.
    pub fn search_partial(&self, criteria: &SearchCriteria) -> Result<SearchOutcome, MemoryError> {
        self.backend.search_partial(criteria)
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
