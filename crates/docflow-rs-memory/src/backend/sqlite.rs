//! SQLite backend storing one row per entry in `memory_entries`.
//!
//! With a database file every call opens its own connection and drops it
//! before returning; there is no pool and no transaction spanning calls.
//! Concurrent writers are serialized by SQLite's locking, bounded by the busy
//! timeout. An in-memory database has a single connection that calls take
//! turns on.

use super::MemoryBackend;
use crate::criteria::SearchCriteria;
use crate::error::MemoryError;
use crate::model::{
    EntryFields, EntryId, MemoryEntry, format_timestamp, parse_timestamp, parse_values,
};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memory_entries (
        id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        type TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        thread_id TEXT,
        conversation_id TEXT,
        extracted_values TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_memory_entries_source ON memory_entries(source);
    CREATE INDEX IF NOT EXISTS idx_memory_entries_type ON memory_entries(type);
    CREATE INDEX IF NOT EXISTS idx_memory_entries_thread ON memory_entries(thread_id);
    CREATE INDEX IF NOT EXISTS idx_memory_entries_timestamp ON memory_entries(timestamp);
";

const SELECT_COLUMNS: &str =
    "SELECT id, source, type, timestamp, thread_id, conversation_id, extracted_values \
     FROM memory_entries";

/// Memory backend over a SQLite database file or a private in-memory
/// database.
#[derive(Debug)]
pub struct SqliteBackend {
    location: Location,
    busy_timeout: Duration,
}

#[derive(Debug)]
enum Location {
    /// Database file; every call opens and drops its own connection.
    File(PathBuf),
    /// In-memory database living on its only connection. Calls take turns
    /// on it, so concurrent writers wait instead of failing.
    Memory(Mutex<Connection>),
}

impl SqliteBackend {
    /// Open (creating if needed) the database at `path` and its table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| MemoryError::unavailable("sqlite", err))?;
        }
        let backend = Self {
            location: Location::File(path.to_path_buf()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        backend.with_connection(|conn| conn.execute_batch(SCHEMA).map_err(unavailable))?;
        info!("initialized sqlite memory backend (path={})", path.display());
        Ok(backend)
    }

    /// Private in-memory database, dropped with the backend.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        info!("initialized sqlite memory backend (in-memory)");
        Ok(Self {
            location: Location::Memory(Mutex::new(conn)),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    /// Bound how long a call waits on a database file locked by another
    /// connection.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Run `op` on a connection scoped to this call.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        match &self.location {
            Location::File(path) => {
                let conn = Connection::open(path).map_err(unavailable)?;
                conn.busy_timeout(self.busy_timeout).map_err(unavailable)?;
                op(&conn)
            }
            Location::Memory(conn) => op(&*conn.lock()),
        }
    }
}

impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn store(&self, entry: &MemoryEntry) -> Result<EntryId, MemoryError> {
        entry.validate()?;
        let id = entry.id();
        let values = serde_json::to_string(entry.extracted_values())
            .map_err(|err| MemoryError::InvalidEntry(format!("extracted_values: {err}")))?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO memory_entries
                 (id, source, type, timestamp, thread_id, conversation_id, extracted_values)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    source = excluded.source,
                    type = excluded.type,
                    timestamp = excluded.timestamp,
                    thread_id = excluded.thread_id,
                    conversation_id = excluded.conversation_id,
                    extracted_values = excluded.extracted_values",
                params![
                    id.as_str(),
                    entry.source(),
                    entry.kind(),
                    format_timestamp(entry.timestamp()),
                    entry.thread_id(),
                    entry.conversation_id(),
                    values,
                ],
            )
            .map_err(unavailable)
        })?;
        debug!("stored memory entry (backend=sqlite, id={id})");
        Ok(id)
    }

    fn retrieve(&self, id: &EntryId) -> Result<Option<MemoryEntry>, MemoryError> {
        let row = self.with_connection(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.as_str()],
                StoredRow::from_row,
            )
            .optional()
            .map_err(unavailable)
        })?;
        row.map(StoredRow::into_entry).transpose()
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<MemoryEntry>, MemoryError> {
        let (clause, values) = build_filter_clause(criteria);
        let sql = format!("{SELECT_COLUMNS}{clause} ORDER BY rowid");
        let rows = self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(unavailable)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), StoredRow::from_row)
                .map_err(unavailable)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(unavailable)
        })?;
        let entries = rows
            .into_iter()
            .map(StoredRow::into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "searched memory entries (backend=sqlite, filters={}, returned={})",
            values.len(),
            entries.len()
        );
        Ok(entries)
    }
}

/// Translate criteria into a `WHERE` clause and its positional values.
///
/// Mirrors [`SearchCriteria::matches`]: `=` never matches NULL, so absent
/// correlation ids are excluded exactly as the predicate excludes them.
pub(crate) fn build_filter_clause(criteria: &SearchCriteria) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();
    let equality = [
        ("source", criteria.source_filter()),
        ("type", criteria.kind_filter()),
        ("thread_id", criteria.thread_filter()),
        ("conversation_id", criteria.conversation_filter()),
    ];
    for (column, value) in equality {
        if let Some(value) = value {
            values.push(value.to_string());
            conditions.push(format!("{column} = ?{}", values.len()));
        }
    }
    if let Some(start) = criteria.start_bound() {
        values.push(format_timestamp(start));
        conditions.push(format!("timestamp >= ?{}", values.len()));
    }
    if let Some(end) = criteria.end_bound() {
        values.push(format_timestamp(end));
        conditions.push(format!("timestamp <= ?{}", values.len()));
    }
    if conditions.is_empty() {
        return (String::new(), values);
    }
    (format!(" WHERE {}", conditions.join(" AND ")), values)
}

/// Row as read from the table, before payload decoding.
struct StoredRow {
    id: String,
    source: String,
    kind: String,
    timestamp: String,
    thread_id: Option<String>,
    conversation_id: Option<String>,
    extracted_values: Option<String>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            kind: row.get(2)?,
            timestamp: row.get(3)?,
            thread_id: row.get(4)?,
            conversation_id: row.get(5)?,
            extracted_values: row.get(6)?,
        })
    }

    fn into_entry(self) -> Result<MemoryEntry, MemoryError> {
        let id = EntryId::from(self.id);
        let timestamp = parse_timestamp(&self.timestamp).map_err(|err| MemoryError::corrupt(&id, err))?;
        let extracted_values = match self.extracted_values.as_deref() {
            Some(raw) => parse_values(raw).map_err(|err| MemoryError::corrupt(&id, err))?,
            None => Default::default(),
        };
        MemoryEntry::restore(EntryFields {
            source: self.source,
            kind: self.kind,
            timestamp,
            thread_id: self.thread_id,
            conversation_id: self.conversation_id,
            extracted_values,
        })
        .map_err(|err| MemoryError::corrupt(&id, err))
    }
}

fn unavailable(err: rusqlite::Error) -> MemoryError {
    MemoryError::unavailable("sqlite", err)
}

#[cfg(test)]
mod tests {
    use super::{SqliteBackend, build_filter_clause};
    use crate::backend::MemoryBackend;
    use crate::backend::in_memory::InMemoryBackend;
    use crate::clock::ManualClock;
    use crate::criteria::SearchCriteria;
    use crate::error::MemoryError;
    use crate::model::{EntryId, MemoryEntry};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use rusqlite::Connection;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sample_entries() -> Vec<MemoryEntry> {
        let clock = ManualClock::default();
        let specs = [
            ("email_agent", "email_processed", Some("run-1"), None),
            ("json_agent", "json_processed", Some("run-1"), Some("conv-1")),
            ("email_agent", "classified", Some("run-2"), Some("conv-1")),
            ("classifier", "classified", None, None),
            ("json_agent", "email_processed", None, Some("conv-2")),
        ];
        specs
            .into_iter()
            .enumerate()
            .map(|(index, (source, kind, thread, conversation))| {
                clock.advance(Duration::milliseconds(250));
                let mut draft = MemoryEntry::draft(source, kind).extracted_values(
                    json!({ "index": index }).as_object().cloned().expect("object"),
                );
                if let Some(thread) = thread {
                    draft = draft.thread_id(thread);
                }
                if let Some(conversation) = conversation {
                    draft = draft.conversation_id(conversation);
                }
                draft.stamp(&clock).expect("entry")
            })
            .collect()
    }

    #[test]
    fn filter_clause_numbers_parameters_in_order() {
        let clock = ManualClock::default();
        let criteria = SearchCriteria::new()
            .source("a")
            .conversation_id("c")
            .start_time(clock.current());
        let (clause, values) = build_filter_clause(&criteria);
        assert_eq!(
            clause,
            " WHERE source = ?1 AND conversation_id = ?2 AND timestamp >= ?3"
        );
        assert_eq!(values.len(), 3);
        assert_eq!(build_filter_clause(&SearchCriteria::new().kind("")).0, "");
    }

    #[test]
    fn sql_filters_agree_with_shared_predicate() {
        let sqlite = SqliteBackend::open_in_memory().expect("sqlite");
        let memory = InMemoryBackend::new();
        let entries = sample_entries();
        for entry in &entries {
            sqlite.store(entry).expect("store sqlite");
            memory.store(entry).expect("store memory");
        }
        let first = entries[0].timestamp();
        let last = entries[entries.len() - 1].timestamp();
        let middle = entries[2].timestamp();
        let cases = vec![
            SearchCriteria::new(),
            SearchCriteria::new().source("email_agent"),
            SearchCriteria::new().kind("classified"),
            SearchCriteria::new().thread_id("run-1"),
            SearchCriteria::new().conversation_id("conv-1"),
            SearchCriteria::new().source("json_agent").kind("email_processed"),
            SearchCriteria::new().start_time(middle),
            SearchCriteria::new().end_time(middle),
            SearchCriteria::new().start_time(first).end_time(last),
            SearchCriteria::new().start_time(last + Duration::microseconds(1)),
            SearchCriteria::new().source("missing"),
            SearchCriteria::new().thread_id("run-1").conversation_id("conv-1"),
            SearchCriteria::new().start_time(middle + Duration::nanoseconds(500)),
            SearchCriteria::new().start_time(middle - Duration::nanoseconds(500)),
            SearchCriteria::new().end_time(middle + Duration::nanoseconds(500)),
            SearchCriteria::new().end_time(middle - Duration::nanoseconds(1)),
            SearchCriteria::new()
                .start_time(middle + Duration::nanoseconds(1))
                .end_time(middle + Duration::nanoseconds(999)),
        ];
        for criteria in cases {
            let expected: Vec<MemoryEntry> = entries
                .iter()
                .filter(|entry| criteria.matches(entry))
                .cloned()
                .collect();
            assert_eq!(sqlite.search(&criteria).expect("sqlite search"), expected);
            assert_eq!(memory.search(&criteria).expect("memory search"), expected);
        }
    }

    #[test]
    fn file_database_persists_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("memory.db");
        let clock = ManualClock::default();
        let entry = MemoryEntry::draft("email_agent", "email_processed")
            .thread_id("run-1")
            .stamp(&clock)
            .expect("entry");

        let id = SqliteBackend::open(&path)
            .expect("open")
            .store(&entry)
            .expect("store");
        let reopened = SqliteBackend::open(&path).expect("reopen");
        assert_eq!(reopened.retrieve(&id).expect("retrieve"), Some(entry));
    }

    #[test]
    fn in_memory_databases_are_private() {
        let first = SqliteBackend::open_in_memory().expect("first");
        let second = SqliteBackend::open_in_memory().expect("second");
        let clock = ManualClock::default();
        let entry = MemoryEntry::draft("a", "b").stamp(&clock).expect("entry");
        let id = first.store(&entry).expect("store");
        assert!(first.retrieve(&id).expect("retrieve").is_some());
        assert_eq!(second.retrieve(&id).expect("retrieve"), None);
    }

    #[test]
    fn in_memory_database_serializes_concurrent_writers() {
        let backend = Arc::new(SqliteBackend::open_in_memory().expect("sqlite"));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let backend = backend.clone();
                std::thread::spawn(move || {
                    let clock = ManualClock::default();
                    for step in 0..50 {
                        clock.advance(Duration::microseconds(1));
                        let entry = MemoryEntry::draft(format!("worker{worker}"), "step")
                            .thread_id(format!("run-{step}"))
                            .stamp(&clock)
                            .expect("entry");
                        backend.store(&entry).expect("store");
                        backend
                            .search(&SearchCriteria::new().source(format!("worker{worker}")))
                            .expect("search");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        let all = backend.search(&SearchCriteria::new()).expect("search");
        assert_eq!(all.len(), 8 * 50);
    }

    #[test]
    fn corrupted_payload_is_reported() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("memory.db");
        let backend = SqliteBackend::open(&path).expect("open");
        let conn = Connection::open(&path).expect("raw connection");
        conn.execute(
            "INSERT INTO memory_entries (id, source, type, timestamp, extracted_values)
             VALUES ('bad_1.000000', 'bad', 'step', '2024-01-01T00:00:00.000000Z', '{oops')",
            [],
        )
        .expect("insert");

        let id = EntryId::from("bad_1.000000");
        let err = backend.retrieve(&id).unwrap_err();
        assert!(matches!(err, MemoryError::DeserializationFailure { id: failed, .. } if failed == id));
        let err = backend.search(&SearchCriteria::new()).unwrap_err();
        assert!(matches!(err, MemoryError::DeserializationFailure { .. }));
    }

    #[test]
    fn unopenable_path_reports_storage_unavailable() {
        let temp = tempdir().expect("tempdir");
        let err = SqliteBackend::open(temp.path()).unwrap_err();
        assert!(matches!(err, MemoryError::StorageUnavailable { backend: "sqlite", .. }));
    }
}
