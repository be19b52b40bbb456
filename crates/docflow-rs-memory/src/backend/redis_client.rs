//! Redis implementation of [`KeyValueClient`].

use super::kv::{KeyValueBackend, KeyValueClient};
use crate::error::MemoryError;
use log::info;
use redis::{Commands, Connection};
use std::collections::HashMap;
use std::time::Duration;

/// Default server, matching a local Redis on database 0.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);
const SCAN_BATCH: usize = 500;

/// Memory backend over a Redis server.
pub type RedisBackend = KeyValueBackend<RedisClient>;

/// Redis client opening one bounded-wait connection per call.
#[derive(Debug, Clone)]
pub struct RedisClient {
    client: redis::Client,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl RedisClient {
    /// Parse `url` (`redis://host:port/db`); no connection is made yet.
    pub fn open(url: &str) -> Result<Self, MemoryError> {
        let client = redis::Client::open(url).map_err(|err| MemoryError::unavailable("redis", err))?;
        Ok(Self {
            client,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    /// Override connect and read/write timeouts.
    pub fn with_timeouts(mut self, connect_timeout: Duration, io_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.io_timeout = io_timeout;
        self
    }

    fn connection(&self) -> Result<Connection, MemoryError> {
        let conn = self
            .client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(|err| MemoryError::unavailable("redis", err))?;
        conn.set_read_timeout(Some(self.io_timeout))
            .map_err(|err| MemoryError::unavailable("redis", err))?;
        conn.set_write_timeout(Some(self.io_timeout))
            .map_err(|err| MemoryError::unavailable("redis", err))?;
        Ok(conn)
    }
}

impl KeyValueClient for RedisClient {
    fn replace_hash(&self, key: &str, fields: &[(String, String)]) -> Result<(), MemoryError> {
        let mut conn = self.connection()?;
        redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .hset_multiple(key, fields)
            .ignore()
            .query::<()>(&mut conn)
            .map_err(|err| MemoryError::unavailable("redis", err))
    }

    fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, MemoryError> {
        let mut conn = self.connection()?;
        conn.hgetall::<_, HashMap<String, String>>(key)
            .map_err(|err| MemoryError::unavailable("redis", err))
    }

    /// Walks the `SCAN` cursor explicitly so a failure on any batch is an
    /// error instead of an early end of the key list.
    fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, MemoryError> {
        let mut conn = self.connection()?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query(&mut conn)
                .map_err(|err| MemoryError::unavailable("redis", err))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    fn increment(&self, key: &str) -> Result<u64, MemoryError> {
        let mut conn = self.connection()?;
        conn.incr::<_, _, u64>(key, 1)
            .map_err(|err| MemoryError::unavailable("redis", err))
    }
}

impl KeyValueBackend<RedisClient> {
    /// Backend for the server at `url` using the default namespace.
    pub fn connect(url: &str) -> Result<Self, MemoryError> {
        let client = RedisClient::open(url)?;
        info!("initialized redis memory backend");
        Ok(Self::new(client))
    }
}
