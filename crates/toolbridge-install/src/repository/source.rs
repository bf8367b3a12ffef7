//! Repository URL parsing and workspace naming.

use std::path::{Path, PathBuf};

use super::RepositoryError;

/// Owner, repository, branch and sub-path parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub sub_path: Option<String>,
}

impl RepositorySpec {
    /// Parse the supported URL shapes:
    ///
    /// - `https://github.com/owner/repo[.git]`
    /// - `https://github.com/owner/repo/tree/<branch>/<sub/path>`
    /// - `github.com/owner/repo`
    /// - `git@github.com:owner/repo.git`
    pub fn parse(url: &str) -> Result<Self, RepositoryError> {
        let invalid = || RepositoryError::InvalidUrl(url.to_string());
        let trimmed = url.trim().trim_end_matches('/');

        let (host, path) = if let Some(rest) = trimmed.strip_prefix("git@") {
            rest.split_once(':').ok_or_else(invalid)?
        } else {
            let without_scheme = trimmed
                .strip_prefix("https://")
                .or_else(|| trimmed.strip_prefix("http://"))
                .unwrap_or(trimmed);
            without_scheme.split_once('/').ok_or_else(invalid)?
        };

        if !host.contains('.') {
            return Err(invalid());
        }

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(invalid)?;
        let repo = segments
            .next()
            .map(|r| r.trim_end_matches(".git"))
            .filter(|r| !r.is_empty())
            .ok_or_else(invalid)?;

        let mut branch = None;
        let mut sub_path = None;
        if matches!(segments.next(), Some("tree" | "blob")) {
            branch = segments.next().map(str::to_string);
            let rest: Vec<&str> = segments.collect();
            if !rest.is_empty() {
                sub_path = Some(rest.join("/"));
            }
        }

        let unsafe_part = |part: &str| RepositoryError::UnsafePath(format!("{part} in {url}"));
        if !is_safe_segment(owner) {
            return Err(unsafe_part(owner));
        }
        if !is_safe_segment(repo) {
            return Err(unsafe_part(repo));
        }
        for nested in branch.iter().chain(sub_path.iter()) {
            if nested.starts_with('-') || !nested.split('/').all(is_safe_segment) {
                return Err(unsafe_part(nested));
            }
        }

        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch,
            sub_path,
        })
    }

    /// HTTPS clone URL.
    pub fn clone_url(&self) -> String {
        format!("https://{}/{}/{}.git", self.host, self.owner, self.repo)
    }

    /// Clone URL routed through a mirror proxy (`<proxy>/<url>`).
    pub fn proxied_clone_url(&self, proxy: Option<&str>) -> String {
        match proxy {
            Some(proxy) => format!("{}/{}", proxy.trim_end_matches('/'), self.clone_url()),
            None => self.clone_url(),
        }
    }

    /// Directory name: `repo` or `repo-branch`.
    pub fn canonical_name(&self) -> String {
        match self.branch {
            Some(ref branch) => format!("{}-{}", self.repo, branch.replace('/', "-")),
            None => self.repo.clone(),
        }
    }

    /// `<root>/<owner>/<repo>[-<branch>]`.
    pub fn canonical_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.owner).join(self.canonical_name())
    }
}

/// A single path component that stays inside its parent directory.
pub(crate) fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', ':', '\0'])
}
