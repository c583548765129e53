//! Configuration management for the application.
//!
//! This module handles loading, validating, and saving application configuration
//! in TOML format with platform-specific directory resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{GrantTable, UserGrants};
use crate::constants::APP_DIR_NAME;

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Inventory storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Inventory JSON file. Defaults to `inventory.json` in the config directory.
    #[serde(default)]
    pub inventory_path: Option<PathBuf>,
    /// How long a toggle waits for a row lock before failing (milliseconds)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            inventory_path: None,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Lock wait timeout as a `Duration`.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Resolves the inventory file path.
    pub fn resolve_inventory_path(&self) -> Result<PathBuf> {
        match &self.inventory_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_dir()?.join("inventory.json")),
        }
    }
}

/// Application configuration.
///
/// # File Location
///
/// - Linux: `~/.config/RackInverter/config.toml`
/// - macOS: `~/Library/Application Support/RackInverter/config.toml`
/// - Windows: `%APPDATA%\RackInverter\config.toml`
///
/// # Example
///
/// ```toml
/// [server]
/// port = 3001
///
/// [storage]
/// lock_timeout_ms = 2000
///
/// [[users]]
/// name = "ops"
///
/// [[users.grants]]
/// kind = "device"
/// actions = ["change"]
/// constraint = { names = ["core-sw-1"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-user permission grants
    #[serde(default)]
    pub users: Vec<UserGrants>,
}

impl Config {
    /// Creates a new Config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Gets the full path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads configuration from the default config file.
    ///
    /// If the file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        Self::load_from(&config_path)
    }

    /// Loads configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .context(format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a specific file using temp file + rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .context(format!("Failed to create config directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, content).context(format!(
            "Failed to write temp config file: {}",
            temp_path.display()
        ))?;

        fs::rename(&temp_path, path).context(format!(
            "Failed to rename temp config file to: {}",
            path.display()
        ))?;

        Ok(())
    }

    /// Validates configuration values.
    ///
    /// Checks:
    /// - `lock_timeout_ms` is non-zero
    /// - user names are non-empty and unique
    /// - every grant lists at least one action
    pub fn validate(&self) -> Result<()> {
        if self.storage.lock_timeout_ms == 0 {
            anyhow::bail!("storage.lock_timeout_ms must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if user.name.trim().is_empty() {
                anyhow::bail!("User name cannot be empty");
            }
            if !seen.insert(user.name.as_str()) {
                anyhow::bail!("Duplicate user entry: {}", user.name);
            }
            if let Some(grant) = user.grants.iter().find(|g| g.actions.is_empty()) {
                anyhow::bail!(
                    "Grant on {} for user {} has no actions",
                    grant.kind,
                    user.name
                );
            }
        }

        Ok(())
    }

    /// Builds the permission table from the configured users.
    #[must_use]
    pub fn grant_table(&self) -> GrantTable {
        GrantTable::new(self.users.iter().cloned())
    }
}
