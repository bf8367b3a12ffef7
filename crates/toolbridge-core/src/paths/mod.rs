//! Canonical locations under the data root.
//!
//! ```text
//! <data_root>/
//!   mcp.json          server registry
//!   package-cache/    local package cache
//!   repositories/     remote repository workspaces
//!   runtimes/         bundled node/bun/python runtimes
//! ```

mod error;
mod platform;

use std::path::{Path, PathBuf};

pub use error::PathError;
pub use platform::{DATA_DIR_ENV, data_root, data_root_with, normalize_user_path};

/// Server registry file name.
pub const REGISTRY_FILE_NAME: &str = "mcp.json";

pub fn registry_file_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE_NAME)
}

pub fn package_cache_dir(root: &Path) -> PathBuf {
    root.join("package-cache")
}

pub fn repositories_dir(root: &Path) -> PathBuf {
    root.join("repositories")
}

/// Directory holding bundled runtimes (`runtimes/node/bin`, `runtimes/bun/bin`, ...).
pub fn runtimes_dir(root: &Path) -> PathBuf {
    root.join("runtimes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = Path::new("/data/toolbridge");
        assert_eq!(
            package_cache_dir(root),
            PathBuf::from("/data/toolbridge/package-cache")
        );
        assert_eq!(
            registry_file_path(root),
            PathBuf::from("/data/toolbridge/mcp.json")
        );
    }
}
