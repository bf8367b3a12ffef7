//! Package identifiers and the per-package manifest file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CacheError;

/// Manifest written next to each cached package.
pub const MANIFEST_FILE_NAME: &str = ".toolbridge-package.json";

/// Launchers whose first positional argument names a package.
const PACKAGE_LAUNCHERS: &[&str] = &["npx", "bunx"];

/// A cached package install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPackage {
    /// Bare package name (no version suffix).
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub install_dir: PathBuf,
    /// Resolved `main` file, absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,
    /// Declared executables, name to absolute path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bin: BTreeMap<String, PathBuf>,
    pub registry: String,
    pub installed_at: DateTime<Utc>,
}

impl CachedPackage {
    pub(super) fn read(dir: &Path) -> Result<Option<Self>, CacheError> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, &e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| CacheError::Manifest {
                path,
                reason: e.to_string(),
            })
    }

    pub(super) fn write(&self) -> Result<(), CacheError> {
        let path = self.install_dir.join(MANIFEST_FILE_NAME);
        let text = serde_json::to_string_pretty(self).map_err(|e| CacheError::Manifest {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, text).map_err(|e| CacheError::io(&path, &e))
    }

    /// Executable to launch: the first declared bin, else the entry file.
    pub fn executable(&self) -> Option<&Path> {
        self.bin
            .values()
            .next()
            .or(self.entry.as_ref())
            .map(PathBuf::as_path)
    }
}

/// Strip a trailing `@version` from a package spec.
///
/// `@scope/name@1.2.3` → `@scope/name`, `name@latest` → `name`.
pub fn bare_package_name(spec: &str) -> &str {
    let spec = spec.trim();
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(idx) => &spec[..search_from + idx],
        None => spec,
    }
}

/// Directory name for a package: `@scope/name` → `@scope+name`.
pub fn cache_dir_name(spec: &str) -> String {
    bare_package_name(spec).replace(['/', '\\'], "+")
}

/// Package a server config would launch through `npx`/`bunx`, if any.
pub fn package_for_command(command: &str, args: &[String]) -> Option<String> {
    let program = Path::new(command)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(command);
    if !PACKAGE_LAUNCHERS.contains(&program) {
        return None;
    }
    args.iter()
        .find(|a| !a.starts_with('-'))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
}

/// Fields read from an installed package's `package.json`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct InstalledPackageJson {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub bin: Option<BinField>,
}

/// `bin` is either a single path or a name→path map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum BinField {
    Single(String),
    Map(BTreeMap<String, String>),
}

impl InstalledPackageJson {
    pub(super) fn bin_map(&self, package: &str, package_dir: &Path) -> BTreeMap<String, PathBuf> {
        match &self.bin {
            Some(BinField::Single(path)) => {
                let name = package.rsplit('/').next().unwrap_or(package).to_string();
                BTreeMap::from([(name, package_dir.join(path))])
            }
            Some(BinField::Map(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), package_dir.join(v)))
                .collect(),
            None => BTreeMap::new(),
        }
    }
}
