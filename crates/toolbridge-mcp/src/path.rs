//! Child process `PATH` construction and working-directory checks.

use crate::resolver::{CommandResolver, ExecutableSearcher, ResolvedCommand};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Validate a working directory.
pub fn validate_working_dir(cwd: &str) -> Result<(), String> {
    let path = Path::new(cwd);

    if !path.exists() {
        return Err(format!("Working directory does not exist: {cwd}"));
    }

    if !path.is_dir() {
        return Err(format!("Working directory path is not a directory: {cwd}"));
    }

    Ok(())
}

/// Build the `PATH` handed to a spawned server.
///
/// Order: the resolved executable's directory, bundled runtimes, runtime
/// install directories (bun, volta, asdf, nvm default, uv/cargo), platform
/// defaults, the inherited `PATH`, then `path_extra`. Duplicates are dropped.
pub fn build_child_path(
    resolver: &CommandResolver,
    resolved: &ResolvedCommand,
    path_extra: Option<&str>,
) -> OsString {
    let env = resolver.env();
    let fs = crate::resolver::SystemFs;
    let searcher = ExecutableSearcher::new(env, &fs);

    let mut entries: Vec<PathBuf> = Vec::new();
    entries.extend(resolved.command_dir().map(Path::to_path_buf));
    if let Some(root) = resolver.runtime_root() {
        entries.extend(ExecutableSearcher::bundled_dirs(root));
    }
    entries.extend(searcher.all_runtime_dirs());
    entries.extend(ExecutableSearcher::platform_default_dirs());
    entries.extend(searcher.path_dirs());
    if let Some(extra) = path_extra {
        entries.extend(std::env::split_paths(extra));
    }

    let mut seen = HashSet::new();
    let deduped: Vec<PathBuf> = entries
        .into_iter()
        .filter(|e| !e.as_os_str().is_empty())
        .filter(|e| seen.insert(e.clone()))
        .collect();

    // Entries containing the separator cannot be joined; drop them
    std::env::join_paths(&deduped).unwrap_or_else(|_| {
        let valid: Vec<&PathBuf> = deduped
            .iter()
            .filter(|p| std::env::join_paths([p]).is_ok())
            .collect();
        std::env::join_paths(valid).unwrap_or_default()
    })
}
