//! Domain types for tool servers and the artifacts they expose.

mod protocol;
mod server;
mod state;

pub use protocol::{
    GetPromptResult, Prompt, PromptArgument, ReadResourceResult, Resource, Tool, ToolCallResult,
};
pub use server::{
    AutoApprove, DEFAULT_HANDSHAKE_TIMEOUT, RepositoryOrigin, ServerConfig, TransportKind,
};
pub use state::{ConnectionState, ListKind};
