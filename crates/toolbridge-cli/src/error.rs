//! CLI-specific error types and exit code mapping.

use thiserror::Error;
use toolbridge_core::{McpServiceError, PathError, SettingsError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Package install or repository fetch failure.
    #[error("Install error: {0}")]
    Install(String),

    /// A server could not be started or reached.
    #[error("Server error: {0}")]
    Server(String),
}

impl CliError {
    /// Exit codes follow sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Server(_) => 69,   // EX_UNAVAILABLE
            Self::Install(_) => 74,  // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }

    fn variant_for(err: &McpServiceError) -> fn(String) -> Self {
        match err {
            McpServiceError::Config(_) | McpServiceError::Source(_) => Self::Config,
            McpServiceError::Install(_) => Self::Install,
            McpServiceError::UnknownServer(_) | McpServiceError::Disabled(_) => Self::Arguments,
            McpServiceError::NotRunning(_)
            | McpServiceError::StartFailed { .. }
            | McpServiceError::Stopped { .. }
            | McpServiceError::Client { .. } => Self::Server,
        }
    }
}

impl From<McpServiceError> for CliError {
    fn from(err: McpServiceError) -> Self {
        Self::variant_for(&err)(err.to_string())
    }
}

/// Exit code for an error bubbling out of a handler.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return cli.exit_code();
    }
    if let Some(service) = err.downcast_ref::<McpServiceError>() {
        return CliError::variant_for(service)(String::new()).exit_code();
    }
    1
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Arguments(format!("invalid JSON: {err}"))
    }
}
