//! Package manager detection for fetched repositories.

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// A JavaScript package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    pub const fn program(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Arguments for installing declared dependencies.
    pub fn install_args(self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Npm => &["install", "--no-audit", "--no-fund"],
            Self::Pnpm | Self::Yarn | Self::Bun => &["install"],
        };
        args.iter().map(|a| (*a).to_string()).collect()
    }

    /// Arguments for running a `package.json` script.
    pub fn run_script_args(self, script: &str) -> Vec<String> {
        vec!["run".to_string(), script.to_string()]
    }

    /// Lock-file precedence; the first present file decides.
    fn from_lock_files(dir: &Path) -> Option<Self> {
        const LOCK_FILES: &[(&str, PackageManager)] = &[
            ("bun.lockb", PackageManager::Bun),
            ("bun.lock", PackageManager::Bun),
            ("pnpm-lock.yaml", PackageManager::Pnpm),
            ("yarn.lock", PackageManager::Yarn),
            ("package-lock.json", PackageManager::Npm),
        ];
        LOCK_FILES
            .iter()
            .find(|(file, _)| dir.join(file).is_file())
            .map(|(_, pm)| *pm)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Whether a `packageManager` field pins Yarn 2 or later.
fn pins_yarn_berry(package_json: &serde_json::Value) -> bool {
    let Some(pinned) = package_json
        .get("packageManager")
        .and_then(serde_json::Value::as_str)
    else {
        return false;
    };
    let Some(version) = pinned.strip_prefix("yarn@") else {
        return false;
    };
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major >= 2)
}

/// Pick the package manager for `dir`.
///
/// Yarn Berry pins conflict with the bundled runtime and fall back to npm, as
/// does any manager that is not installed.
pub fn detect_package_manager(
    dir: &Path,
    package_json: &serde_json::Value,
    is_installed: impl Fn(&str) -> bool,
) -> PackageManager {
    let detected = PackageManager::from_lock_files(dir).unwrap_or(PackageManager::Npm);

    if detected == PackageManager::Yarn && pins_yarn_berry(package_json) {
        tracing::info!(dir = %dir.display(), "Yarn Berry pinned, using npm instead");
        return PackageManager::Npm;
    }

    if detected != PackageManager::Npm && !is_installed(detected.program()) {
        tracing::info!(manager = %detected, "Package manager not installed, using npm");
        return PackageManager::Npm;
    }

    detected
}
