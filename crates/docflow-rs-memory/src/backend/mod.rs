//! Storage backend contract and the bundled backends.

use crate::criteria::{SearchCriteria, SearchOutcome};
use crate::error::MemoryError;
use crate::model::{EntryId, MemoryEntry};
use std::fmt;
use std::str::FromStr;

pub mod in_memory;
pub mod kv;
pub mod redis_client;
pub mod sqlite;

/// Storage contract every backend satisfies identically.
///
/// Result order of `search` is not part of the contract; the bundled
/// backends return entries in insertion order, and an overwritten identifier
/// keeps the position of the entry it replaced.
pub trait MemoryBackend: Send + Sync {
    /// Short backend label used in logs and errors.
    fn name(&self) -> &'static str;

    /// Persist `entry` under its derived identifier and return it.
    ///
    /// An entry whose identifier already exists replaces the stored one.
    fn store(&self, entry: &MemoryEntry) -> Result<EntryId, MemoryError>;

    /// Look up one entry; `Ok(None)` when the identifier is unknown.
    fn retrieve(&self, id: &EntryId) -> Result<Option<MemoryEntry>, MemoryError>;

    /// Every stored entry matching all of `criteria`.
    ///
    /// Fails as a whole if any stored entry cannot be decoded.
    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Like `search`, but may leave out undecodable entries as long as each
    /// one is reported in the outcome.
    fn search_partial(&self, criteria: &SearchCriteria) -> Result<SearchOutcome, MemoryError> {
        Ok(SearchOutcome {
            entries: self.search(criteria)?,
            skipped: Vec::new(),
        })
    }
}

/// Backend variants selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Embedded SQLite database.
    #[default]
    Sqlite,
    /// Remote Redis server.
    Redis,
    /// Process-local map, lost on exit.
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = MemoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            _ => Err(MemoryError::UnknownBackend(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BackendKind;
    use crate::error::MemoryError;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("SQLite".parse::<BackendKind>().expect("sqlite"), BackendKind::Sqlite);
        assert_eq!("redis".parse::<BackendKind>().expect("redis"), BackendKind::Redis);
        assert_eq!(" Memory ".parse::<BackendKind>().expect("memory"), BackendKind::Memory);
        assert_eq!("in-memory".parse::<BackendKind>().expect("alias"), BackendKind::Memory);
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "postgres".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, MemoryError::UnknownBackend(name) if name == "postgres"));
    }

    #[test]
    fn display_round_trips() {
        for kind in [BackendKind::Sqlite, BackendKind::Redis, BackendKind::Memory] {
            assert_eq!(kind.to_string().parse::<BackendKind>().expect("kind"), kind);
        }
    }
}
