//! Engine configuration.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// environment variable holding the storage root
pub const ENV_STORAGE_ROOT: &str = "GITFORGE_STORAGE_ROOT";
/// environment variable holding the default branch
pub const ENV_DEFAULT_BRANCH: &str = "GITFORGE_DEFAULT_BRANCH";
/// environment variable holding the history page size (`0` for unbounded)
pub const ENV_HISTORY_LIMIT: &str = "GITFORGE_HISTORY_LIMIT";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine configuration options.
///
/// The storage root is always passed in explicitly, so two engines (for
/// example in parallel tests) never share a directory by accident.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one subdirectory per repository.
    pub storage_root: PathBuf,
    /// Branch HEAD points at in a freshly provisioned repository.
    pub default_branch: String,
    /// Page size for history listings; `None` walks everything.
    pub history_limit: Option<usize>,
    /// Create the storage root when the engine starts if it is missing.
    pub create_root: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("repositories"),
            default_branch: "main".to_string(),
            history_limit: Some(50),
            create_root: true,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with the given storage root.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Default::default()
        }
    }

    /// Set the default branch.
    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Set the history page size.
    pub fn history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the create_root flag.
    pub fn create_root(mut self, value: bool) -> Self {
        self.create_root = value;
        self
    }

    /// Load from a JSON document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build a configuration from `GITFORGE_*` environment variables.
    ///
    /// The storage root is required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let root = lookup(ENV_STORAGE_ROOT).ok_or(ConfigError::Missing(ENV_STORAGE_ROOT))?;
        let mut config = Self::new(root);

        if let Some(branch) = lookup(ENV_DEFAULT_BRANCH) {
            config.default_branch = branch;
        }

        if let Some(raw) = lookup(ENV_HISTORY_LIMIT) {
            let limit: usize = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_HISTORY_LIMIT,
                value: raw.clone(),
            })?;
            config.history_limit = if limit == 0 { None } else { Some(limit) };
        }

        Ok(config)
    }
}
