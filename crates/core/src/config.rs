//! Configuration via `ontomap.toml`
//!
//! The configuration is an explicit object handed to the storage facade at
//! open time; there is no process-wide holder. On first open, a default
//! `ontomap.toml` can be created next to the data. To change settings, edit
//! the file and reopen.

use crate::error::{OntomapError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the application data directory.
pub const CONFIG_FILE_NAME: &str = "ontomap.toml";

/// Second-level cache eviction policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Least-recently-used eviction, capacity bounded per entity class
    Lru,
    /// Time-to-live expiry
    Ttl,
}

/// When attribute changes are propagated into the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTrackingMode {
    /// Changes are recorded as they happen and staged on the connection
    /// immediately
    Immediate,
    /// Changes are computed by diffing clones against originals at commit
    OnCommit,
}

/// Second-level cache settings, the `[cache]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch; a disabled cache misses on every lookup.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Eviction policy: `"lru"` or `"ttl"`.
    #[serde(default = "default_cache_kind")]
    pub kind: CacheKind,
    /// Per-class entry budget for the LRU policy.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Entry lifetime in seconds for the TTL policy.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_kind() -> CacheKind {
    CacheKind::Lru
}

fn default_cache_capacity() -> usize {
    65536
}

fn default_cache_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            kind: default_cache_kind(),
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Session settings, the `[session]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Change tracking mode: `"immediate"` or `"on_commit"`.
    #[serde(default = "default_change_tracking")]
    pub change_tracking: ChangeTrackingMode,
}

fn default_change_tracking() -> ChangeTrackingMode {
    ChangeTrackingMode::Immediate
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            change_tracking: default_change_tracking(),
        }
    }
}

/// Storage settings, the `[storage]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Namespace prefix for generated individual identifiers.
    #[serde(default = "default_identifier_namespace")]
    pub identifier_namespace: String,
}

fn default_identifier_namespace() -> String {
    "urn:ontomap:instance:".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            identifier_namespace: default_identifier_namespace(),
        }
    }
}

/// Configuration loaded from `ontomap.toml`.
///
/// # Example
///
/// ```toml
/// [cache]
/// enabled = true
/// kind = "lru"       # "lru" or "ttl"
/// capacity = 65536
///
/// [session]
/// change_tracking = "immediate"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OntomapConfig {
    /// Second-level cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl OntomapConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# ontomap configuration
#
# Second-level cache shared by all sessions.
[cache]
# Master switch; disabling turns every lookup into a miss.
enabled = true
# Eviction policy: "lru" (default) or "ttl".
kind = "lru"
# Per-class entry budget for the "lru" policy.
capacity = 65536
# Entry lifetime in seconds for the "ttl" policy.
ttl_secs = 60

[session]
# Change tracking: "immediate" (default) stages changes as attributes are
# written, "on_commit" diffs clones against originals at commit time.
change_tracking = "immediate"

[storage]
# Namespace prefix for generated individual identifiers.
identifier_namespace = "urn:ontomap:instance:"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Unknown cache
    /// kinds and tracking modes are parse errors.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OntomapError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            OntomapError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                OntomapError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| OntomapError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            OntomapError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
