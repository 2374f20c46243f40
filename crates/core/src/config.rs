//! Vault configuration: the `.flint-note/config.json` sidecar file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the sidecar directory holding the config and the index database.
pub const SIDECAR_DIR: &str = ".flint-note";
/// Config file name inside the sidecar.
pub const CONFIG_FILE: &str = "config.json";
/// Index database file name inside the sidecar.
pub const INDEX_FILE: &str = "search.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub vault_path: PathBuf,
    pub vault_name: String,
}

impl VaultConfig {
    /// Load the config from a vault root, creating a default one (and the
    /// sidecar directory) when none exists yet.
    pub fn load_or_init(vault_root: &Path) -> Result<Self, ConfigError> {
        let path = config_path(vault_root);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
            return serde_json::from_str(&raw)
                .map_err(|source| ConfigError::Parse { path, source });
        }

        let config = Self {
            vault_path: vault_root.to_path_buf(),
            vault_name: vault_root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("vault")
                .to_string(),
        };
        config.save(vault_root)?;
        Ok(config)
    }

    pub fn save(&self, vault_root: &Path) -> Result<(), ConfigError> {
        let dir = vault_root.join(SIDECAR_DIR);
        std::fs::create_dir_all(&dir)
            .map_err(|source| ConfigError::Io { path: dir.clone(), source })?;
        let path = config_path(vault_root);
        let raw = serde_json::to_string_pretty(self)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        std::fs::write(&path, raw).map_err(|source| ConfigError::Io { path, source })
    }
}

/// Absolute path of the config file for a vault root.
pub fn config_path(vault_root: &Path) -> PathBuf {
    vault_root.join(SIDECAR_DIR).join(CONFIG_FILE)
}

/// Absolute path of the index database for a vault root.
pub fn index_path(vault_root: &Path) -> PathBuf {
    vault_root.join(SIDECAR_DIR).join(INDEX_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_sidecar_and_config() {
        let dir = TempDir::new().unwrap();
        let config = VaultConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(config.vault_path, dir.path());
        assert!(config_path(dir.path()).exists());
    }

    #[test]
    fn load_reads_existing_config() {
        let dir = TempDir::new().unwrap();
        let mut config = VaultConfig::load_or_init(dir.path()).unwrap();
        config.vault_name = "renamed".to_string();
        config.save(dir.path()).unwrap();

        let reloaded = VaultConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(reloaded.vault_name, "renamed");
    }
}
