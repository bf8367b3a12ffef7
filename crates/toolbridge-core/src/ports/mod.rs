//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the subsystem consumes without committing to an
//! implementation. The host wires concrete adapters at its composition root.

mod config_source;
mod credentials;
mod event_emitter;
mod mcp_error;

pub use config_source::{
    ConfigSourceError, JsonFileConfigSource, ServerConfigSource, ServerRegistry,
    StaticConfigSource,
};
pub use credentials::{CredentialSource, EnvCredentialSource, NoCredentials, PROVIDER_ENV_VARS};
pub use event_emitter::{AppEventEmitter, ChannelEmitter, NoopEmitter, TracingEmitter};
pub use mcp_error::{McpErrorCategory, McpErrorInfo, McpServiceError};
