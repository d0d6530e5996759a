//! CLI command implementations.
//!
//! - [`files`] - File and directory operations against one disk
//! - [`check`] - Configuration validation

pub mod check;
pub mod files;

use std::path::Path;

use anyhow::{Context, Result};
use disks::{DiskManager, DisksConfig};

/// Loads the configuration file and builds a manager over it.
pub fn open_manager(config_path: &Path) -> Result<DiskManager> {
    let config = DisksConfig::load_from(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let manager = DiskManager::new(config)?;
    Ok(manager)
}
