//! Executable resolution entry points.

use super::env::{EnvProvider, SystemEnv};
use super::fs::{FsProvider, SystemFs};
use super::search::ExecutableSearcher;
use super::types::{Attempt, ResolveError, ResolveResult, SearchSource};
use std::path::{Path, PathBuf};

/// Resolve a command to an absolute executable path.
///
/// Search order:
/// 1. Absolute command that is executable
/// 2. `PATH`
/// 3. `/etc/paths` and `/etc/paths.d/*` (macOS only)
/// 4. Platform default directories
/// 5. Version manager locations (asdf, volta, nvm, bun, uv, deno, pyenv)
/// 6. Caller-provided directories
pub fn resolve_executable(
    command: &str,
    user_search_paths: &[String],
) -> Result<ResolveResult, ResolveError> {
    resolve_executable_with_deps(command, user_search_paths, &SystemEnv, &SystemFs)
}

/// Resolve with injected dependencies.
pub fn resolve_executable_with_deps(
    command: &str,
    user_search_paths: &[String],
    env: &dyn EnvProvider,
    fs: &dyn FsProvider,
) -> Result<ResolveResult, ResolveError> {
    if command.is_empty() {
        return Err(ResolveError::EmptyCommand);
    }

    let searcher = ExecutableSearcher::new(env, fs);
    let user_dirs: Vec<PathBuf> = user_search_paths.iter().map(PathBuf::from).collect();
    let steps = [
        (SearchSource::Path, searcher.path_dirs()),
        (SearchSource::EtcPaths, ExecutableSearcher::etc_paths_dirs()),
        (
            SearchSource::PlatformDefault,
            ExecutableSearcher::platform_default_dirs(),
        ),
        (
            SearchSource::VersionManager,
            Vec::new(), // filled per command below
        ),
        (SearchSource::User, user_dirs),
    ];

    let mut attempts = Vec::new();
    let mut warnings = Vec::new();

    let command_path = Path::new(command);
    let bare = if command_path.is_absolute() {
        let outcome = fs.check_executable(command_path);
        let found = outcome.is_ok();
        attempts.push(Attempt {
            candidate: command_path.to_path_buf(),
            source: SearchSource::Absolute,
            outcome: outcome.clone(),
        });
        if found {
            return Ok(ResolveResult {
                resolved_path: command_path.to_path_buf(),
                source: SearchSource::Absolute,
                attempts,
                warnings,
            });
        }

        // Absolute path failed, fall back to its basename
        let Some(basename) = command_path.file_name().and_then(|n| n.to_str()) else {
            return Err(ResolveError::not_resolved(command, &attempts));
        };
        warnings.push(format!(
            "Absolute path '{command}' failed ({outcome}), falling back to basename '{basename}'"
        ));
        basename
    } else {
        command
    };

    for (source, dirs) in steps {
        let dirs = if source == SearchSource::VersionManager {
            searcher.version_manager_dirs(bare)
        } else {
            dirs
        };
        if let Some(result) = search_step(&searcher, bare, &dirs, source, &mut attempts) {
            return Ok(ResolveResult {
                resolved_path: result,
                source,
                attempts,
                warnings,
            });
        }
    }

    Err(ResolveError::not_resolved(command, &attempts))
}

/// Locate an interpreter runtime in priority order: bundled runtimes, version
/// managers, `PATH`, platform defaults.
pub fn resolve_runtime_with_deps(
    command: &str,
    runtime_root: Option<&Path>,
    env: &dyn EnvProvider,
    fs: &dyn FsProvider,
) -> Result<ResolveResult, ResolveError> {
    if command.is_empty() {
        return Err(ResolveError::EmptyCommand);
    }

    let searcher = ExecutableSearcher::new(env, fs);
    let steps = [
        (
            SearchSource::Bundled,
            runtime_root
                .map(ExecutableSearcher::bundled_dirs)
                .unwrap_or_default(),
        ),
        (
            SearchSource::VersionManager,
            searcher.version_manager_dirs(command),
        ),
        (SearchSource::Path, searcher.path_dirs()),
        (
            SearchSource::PlatformDefault,
            ExecutableSearcher::platform_default_dirs(),
        ),
    ];

    let mut attempts = Vec::new();
    for (source, dirs) in steps {
        if let Some(resolved_path) = search_step(&searcher, command, &dirs, source, &mut attempts)
        {
            return Ok(ResolveResult {
                resolved_path,
                source,
                attempts,
                warnings: Vec::new(),
            });
        }
    }

    Err(ResolveError::not_resolved(command, &attempts))
}

fn search_step(
    searcher: &ExecutableSearcher<'_>,
    command: &str,
    dirs: &[PathBuf],
    source: SearchSource,
    all_attempts: &mut Vec<Attempt>,
) -> Option<PathBuf> {
    let step_attempts = searcher.probe_dirs(command, dirs, source);
    let found = step_attempts
        .iter()
        .find(|a| a.outcome.is_ok())
        .map(|a| a.candidate.clone());
    all_attempts.extend(step_attempts);
    found
}
