//! Core domain types and ports for toolbridge.
//!
//! This crate holds everything the other crates agree on: server
//! configuration, protocol artifacts, connection state, the canonical event
//! union, port traits and the data-directory layout. It contains no process or
//! network code.

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    AutoApprove, ConnectionState, DEFAULT_HANDSHAKE_TIMEOUT, GetPromptResult, ListKind, Prompt,
    PromptArgument, ReadResourceResult, RepositoryOrigin, Resource, ServerConfig, Tool,
    ToolCallResult, TransportKind,
};
pub use events::{AppEvent, InstallEvent, RepositoryEvent, Severity};
pub use paths::{PathError, data_root};
pub use ports::{
    AppEventEmitter, ChannelEmitter, ConfigSourceError, CredentialSource, EnvCredentialSource,
    JsonFileConfigSource, McpErrorCategory, McpErrorInfo, McpServiceError, NoCredentials,
    NoopEmitter, ServerConfigSource, ServerRegistry, StaticConfigSource, TracingEmitter,
};
pub use settings::{Settings, SettingsError, validate_settings};
