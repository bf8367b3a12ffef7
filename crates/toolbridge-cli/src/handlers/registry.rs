//! Registry mirror commands.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::commands::RegistryCommand;

pub async fn execute(ctx: &CliContext, command: RegistryCommand) -> Result<()> {
    match command {
        RegistryCommand::Fastest => {
            let selection = ctx.mcp.test_registry_speed().await;
            match selection.latency_ms {
                Some(ms) => println!("{} ({ms} ms)", selection.registry),
                None => println!("{} (no mirror answered)", selection.registry),
            }
        }
        RegistryCommand::Measure => {
            for report in ctx.mcp.measure_registries().await {
                match (report.latency_ms, report.error) {
                    (Some(ms), _) => println!("{:<45} {ms:>6} ms", report.registry),
                    (None, Some(error)) => println!("{:<45} failed: {error}", report.registry),
                    (None, None) => println!("{:<45} no answer", report.registry),
                }
            }
        }
    }
    Ok(())
}
