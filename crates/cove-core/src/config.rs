//! Vault-manager configuration file.
//!
//! One TOML file holds the update cadence and the set of vaults this host
//! supervises. The file is rewritten whole after every mutation; readers
//! always observe a complete snapshot.
//!
//! Resolution order:
//!   1. `./cove-manager.toml` (test mode)
//!   2. `<system app dir>/cove-manager.toml`
//! If neither exists, a fresh default is written at the system path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Config filename, identical in test and production mode.
pub const CONFIG_FILENAME: &str = "cove-manager.toml";

/// Default update cadence: once a day.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Seconds between update-poll ticks.
    pub update_interval_secs: u64,
    /// One entry per supervised vault.
    pub vault_info: Vec<VaultEntry>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            vault_info: Vec::new(),
        }
    }
}

/// Persistent form of one supervised vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub account_name: String,
    /// Hex-encoded keys blob (`crypto::Keypair::to_blob`).
    pub keys: String,
    pub chunkstore_path: PathBuf,
    pub chunkstore_capacity: u64,
    pub requested_to_run: bool,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Where the config lives. Prefers a file in the current directory (test
/// mode); falls back to the system app dir whether or not a file exists
/// there yet.
pub fn resolve_config_path(system_app_dir: &Path) -> PathBuf {
    let local = Path::new(".").join(CONFIG_FILENAME);
    if local.exists() {
        local
    } else {
        system_app_dir.join(CONFIG_FILENAME)
    }
}

/// Test mode is "the config sits in the current directory".
pub fn in_test_mode(config_path: &Path) -> bool {
    config_path == Path::new(".").join(CONFIG_FILENAME)
}

impl ManagerConfig {
    /// Read and parse the config at `path`.
    ///
    /// In test mode a single-byte file is a legal empty config, so tests
    /// can `touch` a placeholder without producing valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        if text.len() == 1 && in_test_mode(path) {
            return Ok(Self::default());
        }
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Serialize and write the config, creating parent directories as
    /// needed. The file is replaced whole.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
