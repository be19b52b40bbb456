//! Configuration schema for Docflow.

use serde::{Deserialize, Serialize};

/// Root config for the Docflow SDK.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DocflowConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl DocflowConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> DocflowConfigBuilder {
        DocflowConfigBuilder::new()
    }
}

/// Builder for assembling a `DocflowConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct DocflowConfigBuilder {
    config: DocflowConfig,
}

impl DocflowConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: DocflowConfig::default(),
        }
    }

    /// Replace the memory configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Select the memory backend by name (`sqlite`, `redis`, `memory`).
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.config.memory.backend = backend.into();
        self
    }

    /// Point the SQLite backend at a database file.
    pub fn sqlite_path(mut self, path: impl Into<String>) -> Self {
        self.config.memory.sqlite.path = Some(path.into());
        self
    }

    /// Point the Redis backend at a server URL.
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.memory.redis.url = url.into();
        self
    }

    /// Finalize and return the built `DocflowConfig`.
    pub fn build(self) -> DocflowConfig {
        self.config
    }
}

/// Shared memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            sqlite: SqliteConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

/// Default memory backend identifier.
fn default_memory_backend() -> String {
    "sqlite".to_string()
}

/// SQLite backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SqliteConfig {
    /// Database file; a private in-memory database when unset.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Redis backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix; entries live at `<namespace>:<id>`.
    #[serde(default = "default_redis_namespace")]
    pub namespace: String,
    #[serde(default = "default_redis_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_redis_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            namespace: default_redis_namespace(),
            connect_timeout_ms: default_redis_timeout_ms(),
            io_timeout_ms: default_redis_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    docflow_rs_memory::DEFAULT_REDIS_URL.to_string()
}

fn default_redis_namespace() -> String {
    docflow_rs_memory::DEFAULT_NAMESPACE.to_string()
}

fn default_redis_timeout_ms() -> u64 {
    2_000
}
