//! Streamed subprocess execution shared by the package cache and the
//! repository fetcher.
//!
//! Output lines are forwarded to an optional sink while the process runs;
//! stderr is collected in full and the tail of stdout is kept for error
//! messages.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Number of trailing stdout lines kept for diagnostics.
const STDOUT_TAIL_LINES: usize = 20;

/// Receives each output line (stdout and stderr) as it arrives.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Errors that can occur while running a subprocess.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("I/O error while running {program}: {reason}")]
    Io { program: String, reason: String },
}

/// A command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Last lines of stdout.
    pub stdout_tail: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with no captured text.
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout_tail: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Human-readable failure reason combining stderr and stdout tail.
    pub fn failure_reason(&self) -> String {
        let mut parts = Vec::new();
        match self.code {
            Some(code) => parts.push(format!("exited with code {code}")),
            None => parts.push("terminated by signal".to_string()),
        }
        if !self.stderr.trim().is_empty() {
            parts.push(format!("stderr: {}", self.stderr.trim()));
        }
        if !self.stdout_tail.trim().is_empty() {
            parts.push(format!("stdout: {}", self.stdout_tail.trim()));
        }
        parts.join("; ")
    }
}

/// Runs external programs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, streaming output lines to `sink`.
    async fn run(
        &self,
        spec: CommandSpec,
        sink: Option<LineSink>,
    ) -> Result<CommandOutput, RunnerError>;

    /// Whether `program` can be found on `PATH`.
    fn is_installed(&self, program: &str) -> bool;
}

/// Runs real processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        spec: CommandSpec,
        sink: Option<LineSink>,
    ) -> Result<CommandOutput, RunnerError> {
        tracing::debug!(command = %spec.display(), "Running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let io_err = |reason: String| RunnerError::Io {
            program: spec.program.clone(),
            reason,
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_err("Missing stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_err("Missing stderr".to_string()))?;

        let stderr_sink = sink.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(ref sink) = stderr_sink {
                    sink(&line);
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDOUT_TAIL_LINES);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await.map_err(|e| io_err(e.to_string()))? {
            if let Some(ref sink) = sink {
                sink(&line);
            }
            if tail.len() == STDOUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        let status = child.wait().await.map_err(|e| io_err(e.to_string()))?;
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout_tail: Vec::from(tail).join("\n"),
            stderr,
        })
    }

    fn is_installed(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
