//! Options and helpers shared by CLI commands.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::store::MemoryStore;

/// Command completed.
pub const EXIT_SUCCESS: u8 = 0;
/// Command ran but the rack data was rejected (out-of-range spans).
pub const EXIT_REJECTED: u8 = 1;
/// Command could not run (permission, missing rack, storage failure).
pub const EXIT_FAILURE: u8 = 2;

/// Config and inventory location options.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Inventory JSON file (overrides storage.inventory_path)
    #[arg(short, long, value_name = "FILE")]
    pub inventory: Option<PathBuf>,
}

impl StoreArgs {
    /// Loads the config file named on the command line, or the default one.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }

    /// Inventory path from the command line, falling back to the config.
    pub fn inventory_path(&self, config: &Config) -> Result<PathBuf> {
        match &self.inventory {
            Some(path) => Ok(path.clone()),
            None => config.storage.resolve_inventory_path(),
        }
    }

    /// Opens the inventory store with the configured lock timeout.
    pub fn open_store(&self, config: &Config) -> Result<MemoryStore> {
        let path = self.inventory_path(config)?;
        if !path.exists() {
            anyhow::bail!("Inventory file not found: {}", path.display());
        }
        Ok(MemoryStore::open(&path)?.with_lock_timeout(config.storage.lock_timeout()))
    }
}
