//! Shared memory and audit trail store for Docflow.
//!
//! Every processing step of the pipeline is recorded as a [`MemoryEntry`]
//! through [`SharedMemory`], which forwards to one of the interchangeable
//! backends: SQLite, Redis, or a process-local map.

pub mod backend;
pub mod clock;
pub mod criteria;
pub mod error;
pub mod model;
pub mod shared;

/// Backend contract and selection.
pub use backend::{BackendKind, MemoryBackend};
/// Bundled backends.
pub use backend::in_memory::InMemoryBackend;
pub use backend::kv::{DEFAULT_NAMESPACE, KeyValueBackend, KeyValueClient};
pub use backend::redis_client::{DEFAULT_REDIS_URL, RedisBackend, RedisClient};
pub use backend::sqlite::SqliteBackend;
/// Clocks for stamping entries.
pub use clock::{Clock, ManualClock, SystemClock};
/// Search criteria and results.
pub use criteria::{SearchCriteria, SearchOutcome, SkippedEntry};
/// Memory error type.
pub use error::MemoryError;
/// Entry model.
pub use model::{EntryDraft, EntryId, ExtractedValues, MemoryEntry};
/// Facade.
pub use shared::{SharedMemory, StoreRequest};
