//! Line-framed JSON-RPC over a child process's stdin/stdout.

use super::{Transport, TransportError};
use crate::jsonrpc::JsonRpcMessage;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Everything needed to spawn a server process.
#[derive(Debug, Clone, Default)]
pub struct StdioLaunch {
    /// Used only for log fields.
    pub server_name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub path: Option<OsString>,
    pub cwd: Option<PathBuf>,
}

pub struct StdioTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    tasks: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    pub fn spawn(launch: &StdioLaunch) -> Result<Self, TransportError> {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(path) = &launch.path {
            command.env("PATH", path);
        }
        for (key, value) in &launch.env {
            command.env(key, value);
        }
        if let Some(cwd) = &launch.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::Spawn(format!(
                "Failed to spawn '{}': {e}\nArgs: {:?}\nCwd: {:?}",
                launch.program, launch.args, launch.cwd
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("Missing stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("Missing stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::Spawn("Missing stderr".to_string()))?;

        tracing::info!(
            server_name = %launch.server_name,
            program = %launch.program,
            pid = ?child.id(),
            "Spawned server process"
        );

        let (tx, rx) = mpsc::channel(64);
        let name = launch.server_name.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match JsonRpcMessage::parse(&line) {
                    Some(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(server_name = %name, line = %line, "Skipping non-JSON-RPC output");
                    }
                }
            }
            tracing::debug!(server_name = %name, "Server stdout closed");
        });

        let name = launch.server_name.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(server_name = %name, "stderr: {line}");
            }
        });

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            inbound: Mutex::new(rx),
            tasks: vec![stdout_task, stderr_task],
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        let line = serde_json::to_string(&message)? + "\n";
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::Closed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        // Dropping stdin signals EOF to well-behaved servers
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "Server process already exited");
            }
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
