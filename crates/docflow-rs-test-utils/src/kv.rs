use docflow_rs_memory::{KeyValueClient, MemoryError};
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-process stand-in for a Redis server.
///
/// Scans return keys in hash-map order, which is as arbitrary as Redis's,
/// and include counter keys as a real keyspace scan would.
#[derive(Debug, Default)]
pub struct FakeKeyValue {
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl FakeKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw fields at `key`, bypassing any encoding.
    pub fn insert_raw(&self, key: &str, fields: &[(&str, &str)]) {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.hashes.lock().insert(key.to_string(), fields);
    }

    pub fn raw(&self, key: &str) -> Option<HashMap<String, String>> {
        self.hashes.lock().get(key).cloned()
    }

    /// Current value of the counter at `key`.
    pub fn counter(&self, key: &str) -> Option<u64> {
        self.counters.lock().get(key).copied()
    }

    /// Hash keys only; counters are left out.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.hashes.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueClient for FakeKeyValue {
    fn replace_hash(&self, key: &str, fields: &[(String, String)]) -> Result<(), MemoryError> {
        let fields = fields.iter().cloned().collect();
        self.hashes.lock().insert(key.to_string(), fields);
        Ok(())
    }

    fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, MemoryError> {
        Ok(self.hashes.lock().get(key).cloned().unwrap_or_default())
    }

    fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, MemoryError> {
        let hashes = self.hashes.lock();
        let counters = self.counters.lock();
        let keys = hashes
            .keys()
            .chain(counters.keys())
            .filter(|key| match pattern.strip_suffix('*') {
                Some(prefix) => key.starts_with(prefix),
                None => key.as_str() == pattern,
            })
            .cloned()
            .collect();
        Ok(keys)
    }

    fn increment(&self, key: &str) -> Result<u64, MemoryError> {
        let mut counters = self.counters.lock();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

/// Client whose server is never reachable.
#[derive(Debug, Default)]
pub struct FailingKeyValue;

impl FailingKeyValue {
    fn down() -> MemoryError {
        MemoryError::StorageUnavailable {
            backend: "redis",
            message: "connection refused".to_string(),
        }
    }
}

impl KeyValueClient for FailingKeyValue {
    fn replace_hash(&self, _key: &str, _fields: &[(String, String)]) -> Result<(), MemoryError> {
        Err(Self::down())
    }

    fn get_hash(&self, _key: &str) -> Result<HashMap<String, String>, MemoryError> {
        Err(Self::down())
    }

    fn scan_keys(&self, _pattern: &str) -> Result<Vec<String>, MemoryError> {
        Err(Self::down())
    }

    fn increment(&self, _key: &str) -> Result<u64, MemoryError> {
        Err(Self::down())
    }
}
