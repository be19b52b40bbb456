//! Public SDK surface for Docflow.
//!
//! This crate re-exports the memory store and its configuration and wires a
//! [`SharedMemory`] from a loaded [`DocflowConfig`].

use anyhow::Context;
use docflow_rs_config::{DocflowConfig, MemoryConfig};
use docflow_rs_memory::{
    BackendKind, InMemoryBackend, KeyValueBackend, MemoryBackend, RedisClient, SharedMemory,
    SqliteBackend,
};
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Re-export for convenience.
pub use docflow_rs_config as config;
/// Re-export for convenience.
pub use docflow_rs_memory as memory;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// Timestamps have millisecond precision and `RUST_LOG` selects the level.
/// This is a no-op if the feature is not enabled or a logger is already
/// installed; the `docflow` binary calls it first thing.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}

/// Build the shared memory facade selected by `config.memory`.
pub fn open_shared_memory(config: &DocflowConfig) -> anyhow::Result<SharedMemory> {
    config.validate().context("invalid config")?;
    let backend = open_backend(&config.memory)?;
    info!("shared memory ready (backend={})", backend.name());
    Ok(SharedMemory::new(backend))
}

/// Build the backend described by `memory` without wrapping it.
pub fn open_backend(memory: &MemoryConfig) -> anyhow::Result<Arc<dyn MemoryBackend>> {
    let kind = memory.backend_kind()?;
    let backend: Arc<dyn MemoryBackend> = match kind {
        BackendKind::Sqlite => {
            let busy_timeout = Duration::from_millis(memory.sqlite.busy_timeout_ms);
            let backend = match memory.sqlite.path.as_deref() {
                Some(path) => SqliteBackend::open(path)
                    .with_context(|| format!("failed to open sqlite database {path}"))?,
                None => SqliteBackend::open_in_memory()
                    .context("failed to open in-memory sqlite database")?,
            };
            Arc::new(backend.with_busy_timeout(busy_timeout))
        }
        BackendKind::Redis => {
            let redis = &memory.redis;
            let client = RedisClient::open(&redis.url)
                .with_context(|| format!("invalid redis url {}", redis.url))?
                .with_timeouts(
                    Duration::from_millis(redis.connect_timeout_ms),
                    Duration::from_millis(redis.io_timeout_ms),
                );
            Arc::new(KeyValueBackend::with_namespace(client, redis.namespace.clone()))
        }
        BackendKind::Memory => Arc::new(InMemoryBackend::new()),
    };
    Ok(backend)
}
