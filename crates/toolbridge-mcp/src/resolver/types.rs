use std::fmt::{self, Write as _};
use std::path::PathBuf;

/// Which search stage produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    /// Command given as an absolute path.
    Absolute,
    /// Runtime shipped under the data root.
    Bundled,
    /// asdf, volta, nvm, bun, uv, deno or pyenv directories.
    VersionManager,
    Path,
    /// macOS `/etc/paths` and `/etc/paths.d`.
    EtcPaths,
    PlatformDefault,
    /// Directories supplied by the caller.
    User,
}

impl SearchSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Bundled => "bundled",
            Self::VersionManager => "version manager",
            Self::Path => "PATH",
            Self::EtcPaths => "/etc/paths",
            Self::PlatformDefault => "platform default",
            Self::User => "user path",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An executable that was found, with the trail that led to it.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub resolved_path: PathBuf,
    pub source: SearchSource,
    pub attempts: Vec<Attempt>,
    /// e.g. an absolute command that was missing and fell back to its file name.
    pub warnings: Vec<String>,
}

/// One probed candidate path.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub candidate: PathBuf,
    pub source: SearchSource,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Ok,
    NotFound,
    NotAFile,
    NotExecutable,
    PermissionDenied,
    IoError(String),
}

impl AttemptOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "usable",
            Self::NotFound => "missing",
            Self::NotAFile => "not a regular file",
            Self::NotExecutable => "no execute permission",
            Self::PermissionDenied => "access denied",
            Self::IoError(msg) => return write!(f, "unreadable ({msg})"),
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("empty launch command")]
    EmptyCommand,

    #[error("`{command}` was not found on this machine; checked:\n{attempts}")]
    NotResolved { command: String, attempts: String },
}

impl ResolveError {
    /// Build a [`ResolveError::NotResolved`] listing every candidate checked.
    pub fn not_resolved(command: impl Into<String>, attempts: &[Attempt]) -> Self {
        let mut listing = String::new();
        for attempt in attempts {
            let _ = writeln!(
                listing,
                "  - {} [{}] {}",
                attempt.candidate.display(),
                attempt.source,
                attempt.outcome
            );
        }
        if listing.is_empty() {
            listing.push_str("  nothing to check\n");
        }
        listing.truncate(listing.trim_end().len());

        Self::NotResolved {
            command: command.into(),
            attempts: listing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_resolved_listing() {
        let err = ResolveError::not_resolved(
            "uvx",
            &[Attempt {
                candidate: PathBuf::from("/usr/bin/uvx"),
                source: SearchSource::Path,
                outcome: AttemptOutcome::NotExecutable,
            }],
        );
        let text = err.to_string();
        assert!(text.contains("`uvx`"));
        assert!(text.contains("/usr/bin/uvx [PATH] no execute permission"));
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn test_empty_listing() {
        let err = ResolveError::not_resolved("x", &[]);
        assert!(err.to_string().ends_with("nothing to check"));
    }
}
