//! Paths command handler.

use anyhow::Result;
use toolbridge_core::paths::{package_cache_dir, repositories_dir, runtimes_dir};

use crate::bootstrap::CliConfig;

/// Print every resolved location in `key = value` form.
pub fn execute(config: &CliConfig) -> Result<()> {
    let root = &config.data_root;
    println!("data_root = {}", root.display());
    println!("registry = {}", config.registry_path.display());
    println!("package_cache = {}", package_cache_dir(root).display());
    println!("repositories = {}", repositories_dir(root).display());
    println!("runtimes = {}", runtimes_dir(root).display());
    Ok(())
}
