//! Tool server configuration types.
//!
//! A `ServerConfig` is immutable once loaded. The manager replaces configs
//! wholesale and never mutates one in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default handshake timeout for a freshly built transport.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(300);

/// Wire channel used to reach a tool server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Spawned local process speaking line-framed JSON-RPC on stdin/stdout.
    #[default]
    #[serde(rename = "stdio")]
    Stdio,
    /// In-process server wired through a linked channel pair.
    #[serde(rename = "inMemory", alias = "in-memory", alias = "inprocess")]
    InMemory,
    /// Long-lived HTTP event stream.
    #[serde(rename = "sse")]
    Sse,
    /// Per-message HTTP request/response channel.
    #[serde(rename = "streamableHttp", alias = "http", alias = "streamable-http")]
    StreamableHttp,
}

impl TransportKind {
    /// Stable tag used in configuration files and events.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::InMemory => "inMemory",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamableHttp",
        }
    }

    /// Whether this transport talks HTTP.
    pub const fn is_http(self) -> bool {
        matches!(self, Self::Sse | Self::StreamableHttp)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "inmemory" | "in-memory" | "inprocess" => Ok(Self::InMemory),
            "sse" => Ok(Self::Sse),
            "streamablehttp" | "streamable-http" | "http" => Ok(Self::StreamableHttp),
            other => Err(format!("Unknown transport kind: {other}")),
        }
    }
}

/// Auto-approval policy for tool calls.
///
/// Accepts `true`/`false` or a list of tool names in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoApprove {
    /// `true` approves every tool, `false` none.
    Flag(bool),
    /// Only the listed tools are approved.
    Tools(Vec<String>),
}

impl Default for AutoApprove {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl AutoApprove {
    /// Whether a call to `tool` may run without asking the user.
    pub fn allows(&self, tool: &str) -> bool {
        match self {
            Self::Flag(all) => *all,
            Self::Tools(tools) => tools.iter().any(|t| t == tool),
        }
    }
}

/// Remote repository a server's code is fetched from before launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryOrigin {
    /// Repository URL (`https://github.com/owner/repo[/tree/branch/sub]`).
    pub url: String,

    /// Workspace directory name to use instead of the canonical one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    /// Human-readable label for progress notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Configuration of a single tool server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Unique server name. Filled from the registry key when loading files.
    pub name: String,

    /// Transport used to reach the server.
    #[serde(rename = "type", alias = "transport")]
    pub transport: TransportKind,

    /// Command to launch (stdio) or in-process server key (inMemory).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments passed to the command.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment overlay for the spawned process.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Endpoint for HTTP transports.
    #[serde(skip_serializing_if = "Option::is_none", alias = "baseUrl")]
    pub url: Option<String>,

    /// Custom HTTP headers sent on every request.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Bearer token for HTTP transports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Working directory for the spawned process.
    #[serde(skip_serializing_if = "Option::is_none", alias = "cwd")]
    pub working_dir: Option<String>,

    /// Extra PATH entries appended for the spawned process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_extra: Option<String>,

    /// Tool auto-approval policy.
    pub auto_approve: AutoApprove,

    /// Disabled servers are never started.
    pub disabled: bool,

    /// Remote repository holding the server's code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryOrigin>,

    /// Handshake timeout override in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ServerConfig {
    /// Create a stdio server configuration.
    #[must_use]
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    /// Create an in-process server configuration keyed by `command`.
    #[must_use]
    pub fn in_memory(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::InMemory,
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Create an SSE server configuration.
    #[must_use]
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Sse,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Create a streamable HTTP server configuration.
    #[must_use]
    pub fn streamable_http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::StreamableHttp,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a custom HTTP header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the repository origin.
    #[must_use]
    pub fn with_repository(mut self, origin: RepositoryOrigin) -> Self {
        self.repository = Some(origin);
        self
    }

    /// Set the auto-approval policy.
    #[must_use]
    pub fn with_auto_approve(mut self, policy: AutoApprove) -> Self {
        self.auto_approve = policy;
        self
    }

    /// Set disabled status.
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Set the handshake timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Effective handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        self.timeout_secs
            .map_or(DEFAULT_HANDSHAKE_TIMEOUT, Duration::from_secs)
    }

    /// Validate configuration based on transport kind.
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Server name cannot be empty".to_string());
        }

        match self.transport {
            TransportKind::Stdio | TransportKind::InMemory => {
                let command = self
                    .command
                    .as_ref()
                    .ok_or_else(|| format!("{} server requires command", self.transport))?;

                if command.trim().is_empty() {
                    return Err(format!("{} server command cannot be empty", self.transport));
                }

                // Flags and arguments belong in `args`
                if self.transport == TransportKind::Stdio
                    && command.trim().contains(char::is_whitespace)
                    && !std::path::Path::new(command).exists()
                {
                    return Err(
                        "Command must be an executable name/path only (e.g., 'npx'). \
                         Put flags and arguments in the 'args' field."
                            .to_string(),
                    );
                }

                Ok(())
            }
            TransportKind::Sse | TransportKind::StreamableHttp => {
                let url = self
                    .url
                    .as_ref()
                    .ok_or_else(|| format!("{} server requires url", self.transport))?;

                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(format!("{} server url must be http(s): {url}", self.transport));
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_from_tag() {
        assert_eq!("stdio".parse::<TransportKind>(), Ok(TransportKind::Stdio));
        assert_eq!(
            "inMemory".parse::<TransportKind>(),
            Ok(TransportKind::InMemory)
        );
        assert_eq!(
            "http".parse::<TransportKind>(),
            Ok(TransportKind::StreamableHttp)
        );
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_deserialize_claude_style_entry() {
        let json = r#"{
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "env": {"DEBUG": "1"},
            "autoApprove": ["read_file"]
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.command.as_deref(), Some("npx"));
        assert_eq!(config.args.len(), 3);
        assert_eq!(config.env.get("DEBUG").map(String::as_str), Some("1"));
        assert!(config.auto_approve.allows("read_file"));
        assert!(!config.auto_approve.allows("write_file"));
        assert!(!config.disabled);
    }

    #[test]
    fn test_deserialize_http_entry() {
        let json = r#"{"type": "streamableHttp", "url": "https://example.com/mcp",
                       "headers": {"X-Team": "core"}, "autoApprove": true}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.transport, TransportKind::StreamableHttp);
        assert!(config.auto_approve.allows("anything"));
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_validate_requires_command_for_stdio() {
        let mut config = ServerConfig::stdio("fs", "npx", vec![]);
        assert!(config.validate().is_ok());

        config.command = None;
        assert!(config.validate().unwrap_err().contains("requires command"));
    }

    #[test]
    fn test_validate_rejects_command_with_flags() {
        let config = ServerConfig::stdio("fs", "npx -y server", vec![]);
        assert!(config.validate().unwrap_err().contains("args"));
    }

    #[test]
    fn test_validate_requires_http_url() {
        assert!(ServerConfig::sse("remote", "https://x/sse").validate().is_ok());
        assert!(ServerConfig::sse("remote", "ftp://x").validate().is_err());
    }

    #[test]
    fn test_handshake_timeout_override() {
        let config = ServerConfig::stdio("fs", "npx", vec![]);
        assert_eq!(config.handshake_timeout(), DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(
            config.with_timeout_secs(7).handshake_timeout(),
            Duration::from_secs(7)
        );
    }
}
