//! Rewrites a configured command line into something the host can spawn.

use super::env::{EnvProvider, SystemEnv};
use super::fs::{FsProvider, SystemFs};
use super::resolve::resolve_runtime_with_deps;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Plain interpreters replaced by the absolute path of the best runtime.
pub const INTERPRETERS: &[&str] = &["node", "bun", "python", "python3", "uv", "deno"];

/// Longest run of arguments joined back into one path.
const MAX_PATH_PARTS: usize = 6;

/// Result of rewriting a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl ResolvedCommand {
    /// Directory of the command when it resolved to an absolute path.
    pub fn command_dir(&self) -> Option<&Path> {
        let path = Path::new(&self.command);
        if path.is_absolute() {
            path.parent()
        } else {
            None
        }
    }
}

/// Applies variable expansion, launcher aliases, interpreter lookup and
/// path reconstruction to a configured command.
#[derive(Clone)]
pub struct CommandResolver {
    env: Arc<dyn EnvProvider>,
    fs: Arc<dyn FsProvider>,
    runtime_root: Option<PathBuf>,
}

impl std::fmt::Debug for CommandResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandResolver")
            .field("runtime_root", &self.runtime_root)
            .finish_non_exhaustive()
    }
}

impl Default for CommandResolver {
    fn default() -> Self {
        Self::system()
    }
}

impl CommandResolver {
    pub fn new(env: Arc<dyn EnvProvider>, fs: Arc<dyn FsProvider>) -> Self {
        Self {
            env,
            fs,
            runtime_root: None,
        }
    }

    /// Resolver backed by the real environment and filesystem.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemEnv), Arc::new(SystemFs))
    }

    /// Directory holding bundled runtimes (`<root>/<runtime>/bin`).
    #[must_use]
    pub fn with_runtime_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtime_root = Some(root.into());
        self
    }

    pub fn runtime_root(&self) -> Option<&Path> {
        self.runtime_root.as_deref()
    }

    pub fn env(&self) -> &dyn EnvProvider {
        self.env.as_ref()
    }

    pub fn resolve(&self, command: &str, args: &[String]) -> ResolvedCommand {
        let command = self.expand(command);
        let args: Vec<String> = args.iter().map(|a| self.expand(a)).collect();
        let args = self.reconstruct_paths(args);

        let (command, prefix, args) = self.apply_launcher_alias(&command, args);
        let command = self.resolve_interpreter(&command);
        let args = args
            .into_iter()
            .map(|arg| {
                if looks_like_command(&arg) {
                    self.resolve_interpreter(&arg)
                } else {
                    arg
                }
            })
            .collect::<Vec<_>>();

        let resolved = ResolvedCommand {
            command,
            args: prefix.into_iter().chain(args).collect(),
        };
        tracing::debug!(
            command = %resolved.command,
            args = ?resolved.args,
            "Resolved server command"
        );
        resolved
    }

    /// Expand `~`, `${VAR}` and `$VAR`; unknown variables stay verbatim.
    pub fn expand(&self, input: &str) -> String {
        let home = || self.env.get_str("HOME").or_else(|| self.env.get_str("USERPROFILE"));
        let lookup = |var: &str| self.env.get_str(var);
        shellexpand::full_with_context_no_errors(input, home, lookup).into_owned()
    }

    /// Absolute path of an installed runtime, falling back to the bare name.
    pub fn resolve_interpreter(&self, name: &str) -> String {
        if !INTERPRETERS.contains(&name) {
            return name.to_string();
        }
        self.find_runtime(name)
            .map_or_else(|| name.to_string(), |p| p.to_string_lossy().into_owned())
    }

    fn find_runtime(&self, name: &str) -> Option<PathBuf> {
        resolve_runtime_with_deps(
            name,
            self.runtime_root.as_deref(),
            self.env.as_ref(),
            self.fs.as_ref(),
        )
        .ok()
        .map(|r| r.resolved_path)
    }

    /// Returns `(command, inserted_subcommand, args)`.
    fn apply_launcher_alias(
        &self,
        command: &str,
        args: Vec<String>,
    ) -> (String, Vec<String>, Vec<String>) {
        match command {
            "npx" | "bunx" => {
                if let Some(bun) = self.find_runtime("bun") {
                    let args = args
                        .into_iter()
                        .skip_while(|a| a == "-y" || a == "--yes")
                        .collect();
                    (bun.to_string_lossy().into_owned(), vec!["x".to_string()], args)
                } else {
                    let npx = self
                        .find_runtime("npx")
                        .map_or_else(|| "npx".to_string(), |p| p.to_string_lossy().into_owned());
                    (npx, Vec::new(), args)
                }
            }
            "uvx" => {
                if let Some(uvx) = self.find_runtime("uvx") {
                    (uvx.to_string_lossy().into_owned(), Vec::new(), args)
                } else if let Some(uv) = self.find_runtime("uv") {
                    (
                        uv.to_string_lossy().into_owned(),
                        vec!["tool".to_string(), "run".to_string()],
                        args,
                    )
                } else {
                    ("uvx".to_string(), Vec::new(), args)
                }
            }
            other => (other.to_string(), Vec::new(), args),
        }
    }

    /// Re-join a path that was split on spaces across leading arguments.
    pub fn reconstruct_paths(&self, args: Vec<String>) -> Vec<String> {
        let Some(first) = args.first() else {
            return args;
        };
        if first.starts_with('-') || self.fs.exists(Path::new(first)) {
            return args;
        }

        let max = args.len().min(MAX_PATH_PARTS);
        for n in 2..=max {
            let joined = args[..n].join(" ");
            if self.fs.exists(Path::new(&joined)) {
                tracing::debug!(path = %joined, parts = n, "Reconstructed split path argument");
                let mut rebuilt = vec![joined];
                rebuilt.extend(args.into_iter().skip(n));
                return rebuilt;
            }
        }
        args
    }
}

fn looks_like_command(arg: &str) -> bool {
    !arg.starts_with('-')
        && !arg.contains('/')
        && !arg.contains('\\')
        && Path::new(arg).extension().is_none()
        && INTERPRETERS.contains(&arg)
}
