//! Command handlers.
//!
//! Handlers are thin: parse CLI input, call `McpService`, format output.
//! Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`.

pub mod cache;
pub mod network;
pub mod paths;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod run;
pub mod servers;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Load the registry and start `server` for a one-shot operation.
pub(crate) async fn start_for_call(ctx: &CliContext, server: &str) -> Result<(), CliError> {
    ctx.mcp.reload_configs().await?;
    ctx.mcp.start_server(server).await?;
    Ok(())
}
