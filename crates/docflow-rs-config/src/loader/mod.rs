//! Layered configuration loader.
//!
//! Discovers configuration layers (user, cwd, repo, runtime overrides), merges
//! them in precedence order and validates the result into a `DocflowConfig`.


use crate::{ConfigError, DocflowConfig, MemoryConfig};
use directories::UserDirs;
use docflow_rs_memory::BackendKind;
use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "docflow.json5";
/// Default config directory under user or repo roots.
const DEFAULT_CONFIG_DIR: &str = ".docflow";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: DocflowConfig,
    /// Layers that were found and merged, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// User-specific configuration.
    User,
    /// Current working directory configuration.
    Cwd,
    /// `.docflow/` directory under the working directory.
    Repo,
    /// Runtime overrides (highest precedence).
    Runtime,
}

/// Metadata about a merged config layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to find local layers.
    pub cwd: PathBuf,
    /// Optional user config path (defaults to `~/.docflow/docflow.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied last; these must exist.
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: default_user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl DocflowConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config from path: {}", path.display());
        Self::load_from_str(&read_file(path)?)
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value)
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations.
    ///
    /// Layer precedence (low -> high): user, cwd, repo, runtime overrides.
    /// Missing optional layers are skipped; a missing runtime layer is an error.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut candidates = Vec::new();
        if let Some(path) = options.user_config_path {
            candidates.push((ConfigLayerSource::User, path));
        }
        candidates.push((ConfigLayerSource::Cwd, options.cwd.join(DEFAULT_CONFIG_FILE)));
        candidates.push((
            ConfigLayerSource::Repo,
            options.cwd.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
        ));

        let mut merged = Value::Object(serde_json::Map::new());
        let mut layers = Vec::new();
        for (source, path) in candidates {
            if !path.exists() {
                debug!(
                    "optional layer missing (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            merge_layer(&mut merged, &read_layer(&path)?);
            layers.push(ConfigLayer { source, path });
        }
        for path in options.runtime_paths {
            merge_layer(&mut merged, &read_layer(&path)?);
            layers.push(ConfigLayer {
                source: ConfigLayerSource::Runtime,
                path,
            });
        }

        let config = config_from_value(merged)?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.memory.validate()
    }
}

impl MemoryConfig {
    /// Parsed backend selection.
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.backend
            .parse()
            .map_err(|_| ConfigError::InvalidField {
                path: "memory.backend".to_string(),
                message: format!(
                    "unknown backend `{}` (expected sqlite, redis or memory)",
                    self.backend
                ),
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.backend_kind()?;
        if self.sqlite.busy_timeout_ms == 0 {
            return Err(invalid("memory.sqlite.busy_timeout_ms", "must be greater than zero"));
        }
        if let Some(path) = &self.sqlite.path {
            if path.trim().is_empty() {
                return Err(invalid("memory.sqlite.path", "must not be empty"));
            }
        }
        let redis = &self.redis;
        if redis.url.trim().is_empty() {
            return Err(invalid("memory.redis.url", "must not be empty"));
        }
        if redis.namespace.is_empty() {
            return Err(invalid("memory.redis.namespace", "must not be empty"));
        }
        if redis.namespace.contains(':') || redis.namespace.contains('*') {
            return Err(invalid("memory.redis.namespace", "must not contain `:` or `*`"));
        }
        if redis.connect_timeout_ms == 0 {
            return Err(invalid("memory.redis.connect_timeout_ms", "must be greater than zero"));
        }
        if redis.io_timeout_ms == 0 {
            return Err(invalid("memory.redis.io_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidField {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn read_layer(path: &Path) -> Result<Value, ConfigError> {
    debug!("loading config layer (path={})", path.display());
    Ok(json5::from_str(&read_file(path)?)?)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay `layer` onto `merged`; objects merge key by key, anything else
/// replaces the lower layer's value.
fn merge_layer(merged: &mut Value, layer: &Value) {
    if let (Value::Object(base), Value::Object(overlay)) = (&mut *merged, layer) {
        for (key, value) in overlay {
            match base.get_mut(key) {
                Some(existing) => merge_layer(existing, value),
                None => {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        return;
    }
    *merged = layer.clone();
}

fn config_from_value(value: Value) -> Result<DocflowConfig, ConfigError> {
    let config: DocflowConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// Default user config path under the home directory.
fn default_user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE)
    })
}
