//! Service-level error taxonomy for tool server operations.

use thiserror::Error;

use super::ConfigSourceError;

/// Errors surfaced by the manager and service.
///
/// Lower layers (transport, client, installer) are flattened into messages so
/// that infrastructure details never leak into this type.
#[derive(Debug, Error)]
pub enum McpServiceError {
    /// No configuration registered under this name.
    #[error("Unknown tool server: {0}")]
    UnknownServer(String),

    /// The server is configured but disabled.
    #[error("Tool server is disabled: {0}")]
    Disabled(String),

    /// No running client for this name.
    #[error("Tool server not running: {0}")]
    NotRunning(String),

    /// Connecting to the server failed.
    #[error("Failed to start tool server {name}: {reason}")]
    StartFailed { name: String, reason: String },

    /// The client gave up after its session could not be recovered and was
    /// removed; the server must be started again explicitly.
    #[error("Tool server {name} stopped: {reason}")]
    Stopped { name: String, reason: String },

    /// A protocol operation on a running client failed.
    #[error("Tool server {name} error: {reason}")]
    Client { name: String, reason: String },

    /// Configuration is invalid.
    #[error("Invalid tool server configuration: {0}")]
    Config(String),

    /// Loading configuration failed.
    #[error(transparent)]
    Source(#[from] ConfigSourceError),

    /// Package cache or repository operation failed.
    #[error("Install error: {0}")]
    Install(String),
}

impl McpServiceError {
    /// Name of the server involved, when there is one.
    pub fn server_name(&self) -> Option<&str> {
        match self {
            Self::UnknownServer(name) | Self::Disabled(name) | Self::NotRunning(name) => Some(name),
            Self::StartFailed { name, .. } | Self::Stopped { name, .. } | Self::Client { name, .. } => {
                Some(name)
            }
            Self::Config(_) | Self::Source(_) | Self::Install(_) => None,
        }
    }
}

/// User-safe error information for error events.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpErrorInfo {
    /// Name of the tool server.
    pub server_name: String,

    /// User-friendly error message.
    pub message: String,

    /// Error category for UI handling.
    pub category: McpErrorCategory,
}

/// Categories of errors for UI handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpErrorCategory {
    /// Connection lifecycle error.
    Connection,
    /// Protocol communication error.
    Protocol,
    /// Configuration error.
    Configuration,
    /// Dependency installation error.
    Install,
    /// Unknown/internal error.
    Unknown,
}

impl McpErrorInfo {
    pub fn new(
        server_name: impl Into<String>,
        message: impl Into<String>,
        category: McpErrorCategory,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            message: message.into(),
            category,
        }
    }

    /// Build error info from a service error.
    pub fn from_error(server_name: impl Into<String>, error: &McpServiceError) -> Self {
        Self::new(server_name, error.to_string(), error.into())
    }
}

impl From<&McpServiceError> for McpErrorCategory {
    fn from(error: &McpServiceError) -> Self {
        match error {
            McpServiceError::UnknownServer(_)
            | McpServiceError::Disabled(_)
            | McpServiceError::Config(_)
            | McpServiceError::Source(_) => Self::Configuration,
            McpServiceError::NotRunning(_)
            | McpServiceError::StartFailed { .. }
            | McpServiceError::Stopped { .. } => Self::Connection,
            McpServiceError::Client { .. } => Self::Protocol,
            McpServiceError::Install(_) => Self::Install,
        }
    }
}
