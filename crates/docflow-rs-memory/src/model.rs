//! Memory entry model and identifier scheme.

use crate::clock::Clock;
use crate::error::MemoryError;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Structured payload attached to an entry. Never inspected by the store.
pub type ExtractedValues = Map<String, Value>;

/// Identifier of a stored entry, `"<source>_<seconds>.<micros>"`.
///
/// Derived from the source and the store timestamp, so two entries from the
/// same source stamped within the same microsecond share an identifier and
/// the later store overwrites the earlier one. It is traceable, not unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Derive the identifier for an entry stored by `source` at `timestamp`.
    ///
    /// Seconds and fraction come from one signed microsecond count, so
    /// instants before the epoch read as their true value (`-0.500000`).
    pub fn derive(source: &str, timestamp: DateTime<Utc>) -> Self {
        let micros = timestamp.timestamp_micros();
        let sign = if micros < 0 { "-" } else { "" };
        let magnitude = micros.unsigned_abs();
        Self(format!(
            "{source}_{sign}{}.{:06}",
            magnitude / 1_000_000,
            magnitude % 1_000_000
        ))
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One audit record of a processing step.
///
/// Immutable once built: fields are only readable, and the timestamp always
/// comes from a [`Clock`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEntry {
    source: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    thread_id: Option<String>,
    conversation_id: Option<String>,
    extracted_values: ExtractedValues,
}

impl MemoryEntry {
    /// Start a new entry for `source` and event `kind`.
    pub fn draft(source: impl Into<String>, kind: impl Into<String>) -> EntryDraft {
        EntryDraft {
            source: source.into(),
            kind: kind.into(),
            thread_id: None,
            conversation_id: None,
            extracted_values: ExtractedValues::new(),
        }
    }

    /// Rebuild a persisted entry, re-checking the required fields.
    pub(crate) fn restore(fields: EntryFields) -> Result<Self, MemoryError> {
        validate(&fields.source, &fields.kind)?;
        Ok(Self {
            source: fields.source,
            kind: fields.kind,
            timestamp: fields.timestamp.trunc_subsecs(6),
            thread_id: fields.thread_id,
            conversation_id: fields.conversation_id,
            extracted_values: fields.extracted_values,
        })
    }

    /// Identifier this entry is stored under.
    pub fn id(&self) -> EntryId {
        EntryId::derive(&self.source, self.timestamp)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Event kind (`type` in every persisted form).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn extracted_values(&self) -> &ExtractedValues {
        &self.extracted_values
    }

    /// Check the required fields; backends call this before persisting.
    pub fn validate(&self) -> Result<(), MemoryError> {
        validate(&self.source, &self.kind)
    }
}

/// Entry under construction; becomes a [`MemoryEntry`] once stamped.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    source: String,
    kind: String,
    thread_id: Option<String>,
    conversation_id: Option<String>,
    extracted_values: ExtractedValues,
}

impl EntryDraft {
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn extracted_values(mut self, values: ExtractedValues) -> Self {
        self.extracted_values = values;
        self
    }

    /// Validate the draft and assign its timestamp from `clock`.
    pub fn stamp(self, clock: &dyn Clock) -> Result<MemoryEntry, MemoryError> {
        validate(&self.source, &self.kind)?;
        Ok(MemoryEntry {
            source: self.source,
            kind: self.kind,
            timestamp: clock.now().trunc_subsecs(6),
            thread_id: self.thread_id,
            conversation_id: self.conversation_id,
            extracted_values: self.extracted_values,
        })
    }
}

/// Raw persisted form of an entry, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct EntryFields {
    pub(crate) source: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) timestamp: DateTime<Utc>,
    #[serde(default)]
    pub(crate) thread_id: Option<String>,
    #[serde(default)]
    pub(crate) conversation_id: Option<String>,
    #[serde(default)]
    pub(crate) extracted_values: ExtractedValues,
}

impl<'de> Deserialize<'de> for MemoryEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = EntryFields::deserialize(deserializer)?;
        Self::restore(fields).map_err(serde::de::Error::custom)
    }
}

fn validate(source: &str, kind: &str) -> Result<(), MemoryError> {
    if source.trim().is_empty() {
        return Err(MemoryError::InvalidEntry("source must not be empty".to_string()));
    }
    if kind.trim().is_empty() {
        return Err(MemoryError::InvalidEntry("type must not be empty".to_string()));
    }
    Ok(())
}

/// Text form used by persisted timestamps.
///
/// Fixed microsecond precision and a `Z` suffix keep lexicographic order
/// equal to chronological order.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Decode a JSON payload column or field.
pub(crate) fn parse_values(value: &str) -> Result<ExtractedValues, serde_json::Error> {
    if value.trim().is_empty() {
        return Ok(ExtractedValues::new());
    }
    serde_json::from_str(value)
}

#[cfg(test)]
mod tests {
    use super::{EntryId, MemoryEntry, format_timestamp, parse_timestamp};
    use crate::clock::ManualClock;
    use crate::error::MemoryError;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn id_uses_source_and_fixed_precision_seconds() {
        let timestamp = Utc.timestamp_opt(1_700_000_000, 5_000).single().expect("ts");
        let id = EntryId::derive("email_agent", timestamp);
        assert_eq!(id.as_str(), "email_agent_1700000000.000005");
    }

    #[test]
    fn id_keeps_sign_for_instants_before_the_epoch() {
        let half_before = Utc.timestamp_micros(-500_000).single().expect("ts");
        assert_eq!(EntryId::derive("a", half_before).as_str(), "a_-0.500000");
        let earlier = Utc.timestamp_micros(-1_500_000).single().expect("ts");
        assert_eq!(EntryId::derive("a", earlier).as_str(), "a_-1.500000");
        assert_ne!(EntryId::derive("a", half_before), EntryId::derive("a", earlier));
    }

    #[test]
    fn stamp_truncates_clock_readings_to_micros() {
        struct NanoClock;
        impl crate::clock::Clock for NanoClock {
            fn now(&self) -> chrono::DateTime<Utc> {
                Utc.timestamp_opt(1_700_000_000, 123_456_789).single().expect("ts")
            }
        }
        let entry = MemoryEntry::draft("a", "b").stamp(&NanoClock).expect("entry");
        assert_eq!(entry.timestamp().timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(entry.id().as_str(), "a_1700000000.123456");
    }

    #[test]
    fn stamp_rejects_empty_source_and_type() {
        let clock = ManualClock::default();
        let err = MemoryEntry::draft("", "t").stamp(&clock).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidEntry(_)));
        let err = MemoryEntry::draft("s", "  ").stamp(&clock).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidEntry(_)));
    }

    #[test]
    fn stamp_takes_timestamp_from_clock() {
        let clock = ManualClock::default();
        let entry = MemoryEntry::draft("agent", "step").stamp(&clock).expect("entry");
        assert_eq!(entry.timestamp(), clock.current());
        assert!(entry.extracted_values().is_empty());
    }

    #[test]
    fn serde_uses_type_field_and_validates() {
        let clock = ManualClock::default();
        let values = json!({"nested": {"list": [1, 2]}})
            .as_object()
            .cloned()
            .expect("object");
        let entry = MemoryEntry::draft("agent", "step")
            .thread_id("t-1")
            .extracted_values(values)
            .stamp(&clock)
            .expect("entry");
        let encoded = serde_json::to_value(&entry).expect("encode");
        assert_eq!(encoded["type"], json!("step"));
        let decoded: MemoryEntry = serde_json::from_value(encoded).expect("decode");
        assert_eq!(decoded, entry);

        let bad = json!({"source": "", "type": "x", "timestamp": "2024-01-01T00:00:00Z"});
        assert!(serde_json::from_value::<MemoryEntry>(bad).is_err());
    }

    #[test]
    fn timestamp_text_orders_chronologically() {
        let early = Utc.timestamp_opt(1_700_000_000, 900_000_000).single().expect("ts");
        let late = Utc.timestamp_opt(1_700_000_001, 0).single().expect("ts");
        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert!(a < b);
        assert_eq!(a, "2023-11-14T22:13:20.900000Z");
        assert_eq!(parse_timestamp(&a).expect("parse"), early);
    }
}
