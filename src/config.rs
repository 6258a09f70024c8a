//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. Environment variables with the `CIVIC_DEDUPE_` prefix
//!    (`CIVIC_DEDUPE_MAX_ALIAS_TEXT_LEN=8192`)
//! 2. `civic-dedupe.toml` in the working directory
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "civic-dedupe.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CIVIC_DEDUPE_";

/// Configuration loading failed.
#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(#[from] Box<figment::Error>);

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Dedupe engine and CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
    /// Longest allowed normalized alias text, in bytes.
    pub max_alias_text_len: usize,
    /// Bound on successor hops when resolving a retired id.
    pub successor_hop_limit: usize,
    /// JSON snapshot the CLI loads and saves.
    pub snapshot_path: PathBuf,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            max_alias_text_len: 4096,
            successor_hop_limit: 128,
            snapshot_path: PathBuf::from("civic-aliases.json"),
            log_filter: "info".to_string(),
        }
    }
}

impl DedupeConfig {
    /// Load from defaults, `civic-dedupe.toml` (if present) and the environment.
    ///
    /// # Errors
    /// - a source exists but does not parse into this shape
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::figment(Path::new(CONFIG_FILE)).extract()?)
    }

    /// Load using an explicit config file path instead of the default one.
    ///
    /// # Errors
    /// - a source exists but does not parse into this shape
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The provider chain, exposed so tests can inspect or extend it.
    #[must_use]
    pub fn figment(file: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }
}
