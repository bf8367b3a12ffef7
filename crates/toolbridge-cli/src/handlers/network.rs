//! Network reachability command.

use anyhow::Result;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext, url: Option<&str>) -> Result<()> {
    let target = url.unwrap_or("the package registry");
    if ctx.mcp.check_network_connection(url).await {
        println!("✓ {target} is reachable");
        Ok(())
    } else {
        anyhow::bail!("{target} is not reachable")
    }
}
