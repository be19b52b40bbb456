//! Search criteria and the shared matching predicate.

use crate::model::{EntryId, MemoryEntry};
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Optional filters for `search`, combined with logical AND.
///
/// Unset criteria are not filtered on; an empty string counts as unset.
/// Time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Exact producing component.
    pub source: Option<String>,
    /// Exact event kind.
    pub kind: Option<String>,
    /// Exact processing-run correlation id.
    pub thread_id: Option<String>,
    /// Exact conversation correlation id.
    pub conversation_id: Option<String>,
    /// Earliest timestamp, inclusive.
    pub start_time: Option<DateTime<Utc>>,
    /// Latest timestamp, inclusive.
    pub end_time: Option<DateTime<Utc>>,
}

impl SearchCriteria {
    /// Criteria matching every entry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
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

    pub fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Source filter, if set and non-empty.
    pub(crate) fn source_filter(&self) -> Option<&str> {
        non_empty(&self.source)
    }

    pub(crate) fn kind_filter(&self) -> Option<&str> {
        non_empty(&self.kind)
    }

    pub(crate) fn thread_filter(&self) -> Option<&str> {
        non_empty(&self.thread_id)
    }

    pub(crate) fn conversation_filter(&self) -> Option<&str> {
        non_empty(&self.conversation_id)
    }

    /// Inclusive lower bound at stored precision: rounded up to the next
    /// whole microsecond.
    pub(crate) fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.start_time.map(|start| {
            let floor = start.trunc_subsecs(6);
            if floor < start {
                floor + Duration::microseconds(1)
            } else {
                floor
            }
        })
    }

    /// Inclusive upper bound at stored precision: truncated to the
    /// microsecond.
    pub(crate) fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.end_time.map(|end| end.trunc_subsecs(6))
    }

    /// True when no criterion filters anything.
    pub fn is_empty(&self) -> bool {
        self.source_filter().is_none()
            && self.kind_filter().is_none()
            && self.thread_filter().is_none()
            && self.conversation_filter().is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }

    /// Whether `entry` satisfies every set criterion.
    ///
    /// Entry timestamps carry microsecond precision, so time bounds are
    /// compared at that precision too.
    ///
    /// Backends without a native query language filter with this predicate;
    /// the SQLite filter clause is kept in agreement with it.
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(source) = self.source_filter() {
            if entry.source() != source {
                return false;
            }
        }
        if let Some(kind) = self.kind_filter() {
            if entry.kind() != kind {
                return false;
            }
        }
        if let Some(thread_id) = self.thread_filter() {
            if entry.thread_id() != Some(thread_id) {
                return false;
            }
        }
        if let Some(conversation_id) = self.conversation_filter() {
            if entry.conversation_id() != Some(conversation_id) {
                return false;
            }
        }
        if let Some(start) = self.start_bound() {
            if entry.timestamp() < start {
                return false;
            }
        }
        if let Some(end) = self.end_bound() {
            if entry.timestamp() > end {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Stored entry left out of a partial search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub id: EntryId,
    /// Why the entry could not be returned.
    pub reason: String,
}

/// Search result that may omit unreadable entries, reporting each one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub entries: Vec<MemoryEntry>,
    pub skipped: Vec<SkippedEntry>,
}

impl SearchOutcome {
    /// Whether any stored entry was left out.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}
