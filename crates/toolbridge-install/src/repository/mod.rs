//! Remote repository fetcher.
//!
//! Clones or updates a repository into `<root>/<owner>/<repo>[-<branch>]`,
//! installs its dependencies and works out which file to launch.
//!
//! Fresh clones go to a sibling staging directory and are renamed into place
//! only after git succeeds, so a half-cloned tree is never mistaken for a
//! workspace. Dependency install and build failures are logged, not returned.

mod entry;
mod package_manager;
mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use toolbridge_core::{AppEvent, AppEventEmitter, RepositoryEvent};

use crate::runner::{CommandRunner, CommandSpec, LineSink, RunnerError};

pub use entry::{CONVENTIONAL_ENTRIES, has_build_output, resolve_entry_file};
pub use package_manager::{PackageManager, detect_package_manager};
pub use source::RepositorySpec;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Unsupported repository URL: {0}")]
    InvalidUrl(String),

    /// A name that would place the workspace outside the repository root.
    #[error("Unsafe repository path component: {0}")]
    UnsafePath(String),

    #[error("I/O error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("git clone of {url} failed: {reason}")]
    CloneFailed { url: String, reason: String },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl RepositoryError {
    fn io(path: &Path, e: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

/// A ready-to-launch repository checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDownload {
    /// Directory to launch from (sub-path applied).
    pub workspace: PathBuf,
    /// Entry file relative to `workspace`.
    pub entry_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManager>,
}

/// Fetches repositories into workspaces under one root.
pub struct RepositoryFetcher {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    emitter: Arc<dyn AppEventEmitter>,
    git_proxy: Option<String>,
}

impl RepositoryFetcher {
    pub fn new(
        root: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        Self {
            root: root.into(),
            runner,
            emitter,
            git_proxy: None,
        }
    }

    /// Route clones through `<proxy>/<url>`.
    #[must_use]
    pub fn with_git_proxy(mut self, proxy: Option<String>) -> Self {
        self.git_proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Clone or update `url`, install dependencies and resolve the entry file.
    pub async fn download(
        &self,
        url: &str,
        target_name: Option<&str>,
        args: &[String],
        label: Option<&str>,
    ) -> Result<RepositoryDownload, RepositoryError> {
        let progress = Progress {
            emitter: Arc::clone(&self.emitter),
            url: url.to_string(),
            label: label.map(str::to_string),
        };
        progress.emit(RepositoryEvent::Started {
            url: progress.url.clone(),
            label: progress.label.clone(),
        });

        let result = self.download_inner(url, target_name, args, &progress).await;

        match &result {
            Ok(download) => {
                tracing::info!(url, workspace = %download.workspace.display(), entry = %download.entry_file, "Repository ready");
                progress.emit(RepositoryEvent::Completed {
                    url: progress.url.clone(),
                    label: progress.label.clone(),
                    workspace: download.workspace.to_string_lossy().into_owned(),
                });
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Repository download failed");
                progress.emit(RepositoryEvent::Failed {
                    url: progress.url.clone(),
                    label: progress.label.clone(),
                    error: e.to_string(),
                });
            }
        }

        result
    }

    async fn download_inner(
        &self,
        url: &str,
        target_name: Option<&str>,
        args: &[String],
        progress: &Progress,
    ) -> Result<RepositoryDownload, RepositoryError> {
        let spec = RepositorySpec::parse(url)?;
        let workspace = self.prepare_workspace_dir(&spec, target_name)?;

        if workspace.join(".git").exists() {
            self.update(&spec, &workspace, progress).await;
        } else {
            self.clone_into(&spec, &workspace, progress).await?;
        }

        let work_dir = match spec.sub_path {
            Some(ref sub) => workspace.join(sub),
            None => workspace,
        };

        let package_json = read_package_json(&work_dir);
        let package_manager = match package_json {
            Some(ref manifest) => Some(self.install_dependencies(&work_dir, manifest, progress).await),
            None => None,
        };

        let entry_file = resolve_entry_file(&work_dir, args, package_json.as_ref());

        Ok(RepositoryDownload {
            workspace: work_dir,
            entry_file,
            package_manager,
        })
    }

    /// Workspace path, renaming the canonical directory to the target if needed.
    fn prepare_workspace_dir(
        &self,
        spec: &RepositorySpec,
        target_name: Option<&str>,
    ) -> Result<PathBuf, RepositoryError> {
        let canonical = spec.canonical_dir(&self.root);
        let target = match target_name.map(str::trim).filter(|t| !t.is_empty()) {
            Some(name) if !source::is_safe_segment(name) => {
                return Err(RepositoryError::UnsafePath(name.to_string()));
            }
            Some(name) if name != spec.canonical_name() => self.root.join(&spec.owner).join(name),
            _ => return Ok(canonical),
        };

        if canonical.exists() && !target.exists() {
            tracing::info!(from = %canonical.display(), to = %target.display(), "Renaming repository workspace");
            std::fs::rename(&canonical, &target).map_err(|e| RepositoryError::io(&target, &e))?;
        }

        Ok(target)
    }

    async fn update(&self, spec: &RepositorySpec, workspace: &Path, progress: &Progress) {
        let mut steps = vec![CommandSpec::new("git", ["fetch", "--depth", "1", "origin"])];
        if let Some(ref branch) = spec.branch {
            steps.push(CommandSpec::new("git", ["checkout", branch.as_str()]));
        }
        steps.push(CommandSpec::new("git", ["pull", "--ff-only"]));

        for step in steps {
            let step = step.current_dir(workspace);
            let shown = step.display();
            progress.message(format!("Running {shown}"));
            match self.runner.run(step, Some(progress.sink())).await {
                Ok(output) if output.success => {}
                Ok(output) => {
                    tracing::warn!(command = %shown, reason = %output.failure_reason(), "Repository update step failed, keeping current checkout");
                    return;
                }
                Err(e) => {
                    tracing::warn!(command = %shown, error = %e, "Repository update step failed, keeping current checkout");
                    return;
                }
            }
        }
    }

    async fn clone_into(
        &self,
        spec: &RepositorySpec,
        workspace: &Path,
        progress: &Progress,
    ) -> Result<(), RepositoryError> {
        let parent = workspace
            .parent()
            .ok_or_else(|| RepositoryError::InvalidUrl(progress.url.clone()))?;
        std::fs::create_dir_all(parent).map_err(|e| RepositoryError::io(parent, &e))?;

        let file_name = workspace
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = parent.join(format!(".{file_name}.staging"));
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| RepositoryError::io(&staging, &e))?;
        }

        let clone_url = spec.proxied_clone_url(self.git_proxy.as_deref());
        let mut args = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
        if let Some(ref branch) = spec.branch {
            args.push("-b".to_string());
            args.push(branch.clone());
        }
        args.push(clone_url.clone());
        args.push(staging.to_string_lossy().into_owned());

        progress.message(format!("Cloning {clone_url}"));
        let outcome = self
            .runner
            .run(
                CommandSpec::new("git", args).env("GIT_TERMINAL_PROMPT", "0"),
                Some(progress.sink()),
            )
            .await;

        let failure = match outcome {
            Ok(output) if output.success => None,
            Ok(output) => Some(output.failure_reason()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = failure {
            if staging.exists() {
                let _ = std::fs::remove_dir_all(&staging);
            }
            return Err(RepositoryError::CloneFailed {
                url: clone_url,
                reason,
            });
        }

        if workspace.exists() {
            std::fs::remove_dir_all(workspace).map_err(|e| RepositoryError::io(workspace, &e))?;
        }
        std::fs::rename(&staging, workspace).map_err(|e| RepositoryError::io(workspace, &e))?;
        Ok(())
    }

    async fn install_dependencies(
        &self,
        work_dir: &Path,
        package_json: &serde_json::Value,
        progress: &Progress,
    ) -> PackageManager {
        let manager = detect_package_manager(work_dir, package_json, |p| {
            self.runner.is_installed(p)
        });

        progress.message(format!("Installing dependencies with {manager}"));
        let install = CommandSpec::new(manager.program(), manager.install_args()).current_dir(work_dir);
        self.run_logged(install, progress).await;

        let has_build_script = package_json
            .pointer("/scripts/build")
            .and_then(serde_json::Value::as_str)
            .is_some();
        if has_build_script && !has_build_output(work_dir) {
            progress.message("Building".to_string());
            let build = CommandSpec::new(manager.program(), manager.run_script_args("build"))
                .current_dir(work_dir);
            self.run_logged(build, progress).await;
        }

        manager
    }

    /// Run a step whose failure must not fail the download.
    async fn run_logged(&self, spec: CommandSpec, progress: &Progress) {
        let shown = spec.display();
        match self.runner.run(spec, Some(progress.sink())).await {
            Ok(output) if output.success => {}
            Ok(output) => {
                tracing::warn!(command = %shown, reason = %output.failure_reason(), "Repository step failed");
            }
            Err(e) => tracing::warn!(command = %shown, error = %e, "Repository step failed"),
        }
    }
}

fn read_package_json(dir: &Path) -> Option<serde_json::Value> {
    let path = dir.join("package.json");
    let text = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed package.json");
            None
        }
    }
}

/// Emits progress events for one download.
struct Progress {
    emitter: Arc<dyn AppEventEmitter>,
    url: String,
    label: Option<String>,
}

impl Progress {
    fn emit(&self, event: RepositoryEvent) {
        self.emitter.emit(AppEvent::repository(event));
    }

    fn message(&self, message: String) {
        self.emit(RepositoryEvent::Progress {
            url: self.url.clone(),
            label: self.label.clone(),
            message,
        });
    }

    fn sink(&self) -> LineSink {
        let emitter = Arc::clone(&self.emitter);
        let url = self.url.clone();
        let label = self.label.clone();
        Arc::new(move |line: &str| {
            emitter.emit(AppEvent::repository(RepositoryEvent::Progress {
                url: url.clone(),
                label: label.clone(),
                message: line.to_string(),
            }));
        })
    }
}
