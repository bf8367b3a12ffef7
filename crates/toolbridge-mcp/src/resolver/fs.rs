use std::io;
use std::path::Path;

use super::types::AttemptOutcome;

/// Filesystem queries made while searching for executables.
pub trait FsProvider: Send + Sync {
    /// Classify `path` as a launch candidate.
    fn check_executable(&self, path: &Path) -> AttemptOutcome;

    fn exists(&self, path: &Path) -> bool;
}

/// Queries the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFs;

impl FsProvider for SystemFs {
    fn check_executable(&self, path: &Path) -> AttemptOutcome {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => return classify_io(&e),
        };
        if !meta.is_file() {
            return AttemptOutcome::NotAFile;
        }
        if has_exec_bit(&meta) {
            AttemptOutcome::Ok
        } else {
            AttemptOutcome::NotExecutable
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

fn classify_io(err: &io::Error) -> AttemptOutcome {
    match err.kind() {
        io::ErrorKind::NotFound => AttemptOutcome::NotFound,
        io::ErrorKind::PermissionDenied => AttemptOutcome::PermissionDenied,
        _ => AttemptOutcome::IoError(err.to_string()),
    }
}

#[cfg(unix)]
fn has_exec_bit(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

// PATHEXT decides executability on Windows; any regular file counts.
#[cfg(not(unix))]
fn has_exec_bit(_meta: &std::fs::Metadata) -> bool {
    true
}

/// What a [`MockFs`] entry represents.
#[cfg(test)]
#[derive(Clone, Copy)]
enum Entry {
    Executable,
    Plain,
}

/// Path table standing in for the filesystem in tests.
#[cfg(test)]
#[derive(Default)]
pub struct MockFs {
    entries: std::collections::HashMap<std::path::PathBuf, Entry>,
}

#[cfg(test)]
impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(mut self, path: impl Into<std::path::PathBuf>, entry: Entry) -> Self {
        self.entries.insert(path.into(), entry);
        self
    }

    #[must_use]
    pub fn with_executable(self, path: impl Into<std::path::PathBuf>) -> Self {
        self.insert(path, Entry::Executable)
    }

    /// An existing file or directory without the executable bit.
    #[must_use]
    pub fn with_path(self, path: impl Into<std::path::PathBuf>) -> Self {
        self.insert(path, Entry::Plain)
    }
}

#[cfg(test)]
impl FsProvider for MockFs {
    fn check_executable(&self, path: &Path) -> AttemptOutcome {
        match self.entries.get(path) {
            Some(Entry::Executable) => AttemptOutcome::Ok,
            Some(Entry::Plain) => AttemptOutcome::NotExecutable,
            None => AttemptOutcome::NotFound,
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }
}
