//! CLI setup module
//!
//! Loads configuration and opens the Warden core for CLI usage.

use anyhow::Result;
use std::path::{Path, PathBuf};
use warden_core::WardenCore;
use warden_core::config::WardenConfig;

/// Build the embedded Warden core, honouring `--config` and `--db`.
pub fn prepare_core(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<WardenCore> {
    let mut config = match config_path {
        Some(path) => WardenConfig::load_from_path(path)?,
        None => WardenConfig::load()?,
    };
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    WardenCore::new(config)
}
