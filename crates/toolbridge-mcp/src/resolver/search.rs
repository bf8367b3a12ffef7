//! Candidate directories and per-directory executable probing.

use super::env::EnvProvider;
use super::fs::FsProvider;
use super::types::{Attempt, SearchSource};
use std::path::{Path, PathBuf};

/// Runtimes that may be bundled under `<data_root>/runtimes/<name>/bin`.
const BUNDLED_RUNTIMES: &[&str] = &["node", "bun", "python", "uv", "deno"];

/// Searches for executables across the known install locations.
pub struct ExecutableSearcher<'a> {
    env: &'a dyn EnvProvider,
    fs: &'a dyn FsProvider,
}

impl<'a> ExecutableSearcher<'a> {
    pub fn new(env: &'a dyn EnvProvider, fs: &'a dyn FsProvider) -> Self {
        Self { env, fs }
    }

    /// Check `command` in each directory, stopping at the first executable.
    pub fn probe_dirs(&self, command: &str, dirs: &[PathBuf], source: SearchSource) -> Vec<Attempt> {
        let mut attempts = Vec::new();
        for dir in dirs {
            if dir.as_os_str().is_empty() {
                continue;
            }
            for variant in self.command_variants(command) {
                let candidate = dir.join(&variant);
                let outcome = self.fs.check_executable(&candidate);
                let found = outcome.is_ok();
                attempts.push(Attempt {
                    candidate,
                    source,
                    outcome,
                });
                if found {
                    return attempts;
                }
            }
        }
        attempts
    }

    /// Entries of the `PATH` variable.
    pub fn path_dirs(&self) -> Vec<PathBuf> {
        self.env
            .get("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default()
    }

    /// Directories listed in `/etc/paths` and `/etc/paths.d/*` (macOS).
    #[cfg(target_os = "macos")]
    pub fn etc_paths_dirs() -> Vec<PathBuf> {
        let mut files = vec![PathBuf::from("/etc/paths")];
        if let Ok(entries) = std::fs::read_dir("/etc/paths.d") {
            files.extend(entries.flatten().map(|e| e.path()));
        }

        files
            .iter()
            .filter_map(|f| std::fs::read_to_string(f).ok())
            .flat_map(|contents| {
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(PathBuf::from)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[cfg(not(target_os = "macos"))]
    pub const fn etc_paths_dirs() -> Vec<PathBuf> {
        Vec::new()
    }

    /// Platform-specific system directories.
    pub fn platform_default_dirs() -> Vec<PathBuf> {
        let dirs: &[&str] = if cfg!(target_os = "macos") {
            &[
                "/opt/homebrew/bin", // Apple Silicon Homebrew
                "/usr/local/bin",
                "/usr/bin",
                "/bin",
                "/usr/sbin",
                "/sbin",
            ]
        } else if cfg!(windows) {
            &[]
        } else {
            &["/usr/local/bin", "/usr/bin", "/bin"]
        };
        dirs.iter().map(PathBuf::from).collect()
    }

    /// `<root>/<runtime>/bin` for every runtime that may be bundled.
    pub fn bundled_dirs(runtime_root: &Path) -> Vec<PathBuf> {
        BUNDLED_RUNTIMES
            .iter()
            .map(|rt| {
                if cfg!(windows) {
                    runtime_root.join(rt)
                } else {
                    runtime_root.join(rt).join("bin")
                }
            })
            .collect()
    }

    /// Version manager locations relevant to `command`, in priority order.
    pub fn version_manager_dirs(&self, command: &str) -> Vec<PathBuf> {
        let Some(home) = self.home() else {
            return Vec::new();
        };

        match command {
            "node" | "npm" | "npx" => {
                let mut dirs = vec![home.join(".asdf/shims"), home.join(".volta/bin")];
                dirs.extend(nvm_dirs(&home));
                dirs
            }
            "bun" | "bunx" => vec![home.join(".bun/bin")],
            "uv" | "uvx" => vec![home.join(".local/bin"), home.join(".cargo/bin")],
            "deno" => vec![home.join(".deno/bin")],
            "python" | "python3" => vec![home.join(".pyenv/shims"), home.join(".asdf/shims")],
            _ => Vec::new(),
        }
    }

    /// Every runtime install directory, in PATH priority order.
    pub fn all_runtime_dirs(&self) -> Vec<PathBuf> {
        let Some(home) = self.home() else {
            return Vec::new();
        };
        let mut dirs = vec![
            home.join(".bun/bin"),
            home.join(".volta/bin"),
            home.join(".asdf/shims"),
        ];
        dirs.extend(nvm_dirs(&home).into_iter().take(1));
        dirs.push(home.join(".local/bin"));
        dirs.push(home.join(".cargo/bin"));
        dirs
    }

    fn home(&self) -> Option<PathBuf> {
        self.env
            .get("HOME")
            .or_else(|| self.env.get("USERPROFILE"))
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
    }

    /// File names to try for a command (PATHEXT variants on Windows).
    fn command_variants(&self, command: &str) -> Vec<String> {
        let mut variants = vec![command.to_string()];
        if cfg!(windows) {
            let pathext = self
                .env
                .get_str("PATHEXT")
                .unwrap_or_else(|| ".COM;.EXE;.BAT;.CMD".to_string());
            variants.extend(
                pathext
                    .split(';')
                    .filter(|ext| !ext.is_empty())
                    .map(|ext| format!("{command}{}", ext.to_ascii_lowercase())),
            );
        }
        variants
    }
}

/// nvm's default version first, then installed versions newest first.
fn nvm_dirs(home: &Path) -> Vec<PathBuf> {
    let nvm_dir = home.join(".nvm");
    let versions_dir = nvm_dir.join("versions/node");
    let mut dirs = Vec::new();

    if let Ok(alias) = std::fs::read_to_string(nvm_dir.join("alias/default")) {
        let alias = alias.trim();
        let version = if alias.starts_with('v') {
            alias.to_string()
        } else {
            format!("v{alias}")
        };
        dirs.push(versions_dir.join(version).join("bin"));
    }

    if let Ok(entries) = std::fs::read_dir(&versions_dir) {
        let mut versions: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        versions.sort_by(|a, b| version_key(b).cmp(&version_key(a)));
        dirs.extend(versions.iter().map(|v| versions_dir.join(v).join("bin")));
    }

    dirs
}

/// Numeric sort key for `v20.11.1`.
fn version_key(version: &str) -> Vec<u64> {
    version
        .trim_start_matches('v')
        .split('.')
        .map(|p| p.parse().unwrap_or(0))
        .collect()
}
