//! Key-value backend storing each entry as a hash under a namespaced key.
//!
//! The store has no query language, so `search` scans every key in the
//! namespace, decodes each hash and filters with [`SearchCriteria::matches`].
//! Search cost is linear in the number of stored entries whatever the
//! criteria; acceptable for audit volumes, not for large archives.
//!
//! Scans come back in arbitrary order. Each entry therefore records its
//! position from a per-namespace counter at `<namespace>:seq`, and search
//! results are sorted on it.

use super::MemoryBackend;
use crate::criteria::{SearchCriteria, SearchOutcome, SkippedEntry};
use crate::error::MemoryError;
use crate::model::{
    EntryFields, EntryId, MemoryEntry, format_timestamp, parse_timestamp, parse_values,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;

/// Default key namespace; entries live at `memory:<id>`.
pub const DEFAULT_NAMESPACE: &str = "memory";

const FIELD_SOURCE: &str = "source";
const FIELD_TYPE: &str = "type";
const FIELD_TIMESTAMP: &str = "timestamp";
const FIELD_THREAD_ID: &str = "thread_id";
const FIELD_CONVERSATION_ID: &str = "conversation_id";
const FIELD_VALUES: &str = "extracted_values";
const FIELD_SEQ: &str = "seq";
/// Counter key suffix; never a valid entry identifier.
const SEQ_KEY: &str = "seq";

/// Minimal hash-store operations the backend needs from a remote server.
pub trait KeyValueClient: Send + Sync {
    /// Replace whatever is stored at `key` with exactly `fields`.
    fn replace_hash(&self, key: &str, fields: &[(String, String)]) -> Result<(), MemoryError>;

    /// All fields at `key`; empty when the key does not exist.
    fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, MemoryError>;

    /// Keys matching a glob `pattern` such as `memory:*`.
    ///
    /// Must fail rather than return a truncated list.
    fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, MemoryError>;

    /// Atomically increment the counter at `key` and return the new value.
    fn increment(&self, key: &str) -> Result<u64, MemoryError>;
}

/// Memory backend over any [`KeyValueClient`].
#[derive(Debug)]
pub struct KeyValueBackend<C> {
    client: C,
    namespace: String,
}

impl<C: KeyValueClient> KeyValueBackend<C> {
    /// Backend using the default `memory` namespace.
    pub fn new(client: C) -> Self {
        Self::with_namespace(client, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(client: C, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, id: &EntryId) -> String {
        format!("{}:{id}", self.namespace)
    }

    fn seq_key(&self) -> String {
        format!("{}:{SEQ_KEY}", self.namespace)
    }

    /// Identifier part of a namespaced key; keys are split on the first
    /// separator only, so identifiers may themselves contain `:`.
    fn id_from_key(&self, key: &str) -> Option<EntryId> {
        key.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .map(EntryId::from)
    }

    /// Fetch and decode every entry in the namespace, in insertion order.
    ///
    /// Keys removed between the scan and the fetch are dropped.
    fn load_all(&self) -> Result<Vec<Loaded>, MemoryError> {
        let pattern = format!("{}:*", self.namespace);
        let seq_key = self.seq_key();
        let keys = self.client.scan_keys(&pattern)?;
        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            if key == seq_key {
                continue;
            }
            let Some(id) = self.id_from_key(&key) else {
                continue;
            };
            let fields = self.client.get_hash(&key)?;
            if fields.is_empty() {
                debug!("memory entry vanished during scan (id={id})");
                continue;
            }
            let seq = parse_seq(&fields);
            let decoded = decode_entry(&id, fields);
            loaded.push(Loaded { id, seq, decoded });
        }
        loaded.sort_by(|left, right| left.order_key().cmp(&right.order_key()));
        Ok(loaded)
    }

    /// Position for `id`: kept from an entry it overwrites, otherwise the
    /// next counter value.
    fn position(&self, key: &str) -> Result<u64, MemoryError> {
        match parse_seq(&self.client.get_hash(key)?) {
            Some(seq) => Ok(seq),
            None => self.client.increment(&self.seq_key()),
        }
    }
}

/// One scanned entry with its insertion position.
struct Loaded {
    id: EntryId,
    seq: Option<u64>,
    decoded: Result<MemoryEntry, MemoryError>,
}

impl Loaded {
    /// Entries written without a position sort after the rest, by time.
    fn order_key(&self) -> (bool, Option<u64>, Option<DateTime<Utc>>, &EntryId) {
        let timestamp = self.decoded.as_ref().ok().map(MemoryEntry::timestamp);
        (self.seq.is_none(), self.seq, timestamp, &self.id)
    }
}

impl<C: KeyValueClient> MemoryBackend for KeyValueBackend<C> {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn store(&self, entry: &MemoryEntry) -> Result<EntryId, MemoryError> {
        entry.validate()?;
        let id = entry.id();
        let key = self.key(&id);
        let mut fields = encode_entry(entry)?;
        let seq = self.position(&key)?;
        fields.push((FIELD_SEQ.to_string(), seq.to_string()));
        self.client.replace_hash(&key, &fields)?;
        debug!(
            "stored memory entry (backend=redis, id={id}, fields={})",
            fields.len()
        );
        Ok(id)
    }

    fn retrieve(&self, id: &EntryId) -> Result<Option<MemoryEntry>, MemoryError> {
        let fields = self.client.get_hash(&self.key(id))?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode_entry(id, fields).map(Some)
    }

    fn search(&self, criteria: &SearchCriteria) -> Result<Vec<MemoryEntry>, MemoryError> {
        let loaded = self.load_all()?;
        let scanned = loaded.len();
        let mut entries = Vec::new();
        for item in loaded {
            let entry = item.decoded?;
            if criteria.matches(&entry) {
                entries.push(entry);
            }
        }
        debug!(
            "searched memory entries (backend=redis, scanned={scanned}, returned={})",
            entries.len()
        );
        Ok(entries)
    }

    fn search_partial(&self, criteria: &SearchCriteria) -> Result<SearchOutcome, MemoryError> {
        let mut outcome = SearchOutcome::default();
        for Loaded { id, decoded, .. } in self.load_all()? {
            match decoded {
                Ok(entry) if criteria.matches(&entry) => outcome.entries.push(entry),
                Ok(_) => {}
                Err(err) => {
                    warn!("skipping unreadable memory entry (id={id}): {err}");
                    outcome.skipped.push(SkippedEntry {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }
}

fn parse_seq(fields: &HashMap<String, String>) -> Option<u64> {
    fields.get(FIELD_SEQ).and_then(|seq| seq.parse().ok())
}

fn encode_entry(entry: &MemoryEntry) -> Result<Vec<(String, String)>, MemoryError> {
    let values = serde_json::to_string(entry.extracted_values())
        .map_err(|err| MemoryError::InvalidEntry(format!("extracted_values: {err}")))?;
    let mut fields = vec![
        (FIELD_SOURCE.to_string(), entry.source().to_string()),
        (FIELD_TYPE.to_string(), entry.kind().to_string()),
        (FIELD_TIMESTAMP.to_string(), format_timestamp(entry.timestamp())),
        (FIELD_VALUES.to_string(), values),
    ];
    if let Some(thread_id) = entry.thread_id() {
        fields.push((FIELD_THREAD_ID.to_string(), thread_id.to_string()));
    }
    if let Some(conversation_id) = entry.conversation_id() {
        fields.push((FIELD_CONVERSATION_ID.to_string(), conversation_id.to_string()));
    }
    Ok(fields)
}

fn decode_entry(
    id: &EntryId,
    mut fields: HashMap<String, String>,
) -> Result<MemoryEntry, MemoryError> {
    let mut required = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| MemoryError::corrupt(id, format!("missing field `{name}`")))
    };
    let source = required(FIELD_SOURCE)?;
    let kind = required(FIELD_TYPE)?;
    let timestamp = required(FIELD_TIMESTAMP)?;
    let timestamp =
        parse_timestamp(&timestamp).map_err(|err| MemoryError::corrupt(id, err))?;
    let extracted_values = match fields.remove(FIELD_VALUES) {
        Some(raw) => parse_values(&raw).map_err(|err| MemoryError::corrupt(id, err))?,
        None => Default::default(),
    };
    MemoryEntry::restore(EntryFields {
        source,
        kind,
        timestamp,
        thread_id: fields.remove(FIELD_THREAD_ID),
        conversation_id: fields.remove(FIELD_CONVERSATION_ID),
        extracted_values,
    })
    .map_err(|err| MemoryError::corrupt(id, err))
}
