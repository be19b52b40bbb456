//! Process-local backend; entries live as long as the backend does.

use super::MemoryBackend;
use crate::criteria::SearchCriteria;
use crate::error::MemoryError;
use crate::model::{EntryId, MemoryEntry};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Insertion-ordered map from identifier to entry behind a single lock.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: Mutex<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    order: Vec<EntryId>,
    by_id: HashMap<EntryId, MemoryEntry>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, entry: &MemoryEntry) -> Result<EntryId, MemoryError> {
        entry.validate()?;
        let id = entry.id();
        let mut inner = self.inner.lock();
        if inner.by_id.insert(id.clone(), entry.clone()).is_some() {
            debug!("overwrote colliding memory entry (id={id})");
        } else {
            inner.order.push(id.clone());
        }
        debug!("stored memory entry (backend=memory, id={id})");
        Ok(id)
    }

    fn retrieve(&self, id: &EntryId) -> Result<Option<MemoryEntry>, MemoryError> {
        Ok(self.inner.lock().by_id.get(id).cloned())
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<MemoryEntry>, MemoryError> {
        let inner = self.inner.lock();
        let entries: Vec<MemoryEntry> = inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|entry| criteria.matches(entry))
            .cloned()
            .collect();
        debug!(
            "searched memory entries (backend=memory, scanned={}, returned={})",
            inner.order.len(),
            entries.len()
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryBackend;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::criteria::SearchCriteria;
    use crate::model::MemoryEntry;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn overwrite_keeps_original_position() {
        let backend = InMemoryBackend::new();
        let clock = ManualClock::default();
        let first = MemoryEntry::draft("a", "one").stamp(&clock).expect("entry");
        clock.advance(Duration::seconds(1));
        let second = MemoryEntry::draft("b", "two").stamp(&clock).expect("entry");
        let replacement = MemoryEntry::draft("a", "three")
            .stamp(&ManualClock::new(first.timestamp()))
            .expect("entry");

        backend.store(&first).expect("store");
        backend.store(&second).expect("store");
        let id = backend.store(&replacement).expect("store");
        assert_eq!(id, first.id());
        assert_eq!(backend.len(), 2);

        let all = backend.search(&SearchCriteria::new()).expect("search");
        assert_eq!(all, vec![replacement, second]);
    }
}
