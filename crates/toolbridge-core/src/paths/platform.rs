//! Locating the data root on the host.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "TOOLBRIDGE_DATA_DIR";

const APP_DIR: &str = "toolbridge";

/// Data root from `TOOLBRIDGE_DATA_DIR`, falling back to the per-user data
/// directory (`~/.local/share/toolbridge` on Linux). Created when missing.
pub fn data_root() -> Result<PathBuf, PathError> {
    data_root_with(env::var(DATA_DIR_ENV).ok())
}

/// Same as [`data_root`] but with the override passed in.
pub fn data_root_with(override_dir: Option<String>) -> Result<PathBuf, PathError> {
    let chosen = override_dir.filter(|p| !p.trim().is_empty());
    let root = if let Some(raw) = chosen {
        normalize_user_path(&raw)?
    } else {
        let base = dirs::data_local_dir().ok_or(PathError::DataDirUnavailable)?;
        base.join(APP_DIR)
    };
    ensure_dir(&root)?;
    Ok(root)
}

fn ensure_dir(dir: &Path) -> Result<(), PathError> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| PathError::Create {
        path: dir.to_path_buf(),
        source,
    })
}

/// Expand a leading `~` and anchor relative paths at the working directory.
pub fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PathError::Blank);
    }

    let path = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = dirs::home_dir().ok_or(PathError::HomeUnavailable)?;
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(raw),
    };

    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = env::current_dir().map_err(PathError::WorkingDir)?;
    Ok(cwd.join(path))
}
