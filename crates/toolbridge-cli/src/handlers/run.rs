//! Long-running mode: start default servers and stream events.

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext) -> Result<()> {
    let mut events = ctx.events.subscribe();
    ctx.mcp.initialize().await?;

    let running = ctx.mcp.manager().running_servers().await;
    if running.is_empty() {
        println!("No servers running (check defaultServers in {})", ctx.config.registry_path.display());
    } else {
        println!("Running: {}", running.join(", "));
    }
    println!("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Unprintable event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!("Stopping servers...");
    Ok(())
}
