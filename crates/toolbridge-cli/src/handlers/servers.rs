//! Server registry and lifecycle commands.

use anyhow::Result;
use toolbridge_core::{AutoApprove, ServerConfig};

use super::start_for_call;
use crate::bootstrap::CliContext;
use crate::commands::ServersCommand;
use crate::presentation::{format_optional, print_separator, truncate_string};

pub async fn execute(ctx: &CliContext, command: ServersCommand) -> Result<()> {
    match command {
        ServersCommand::List => list(ctx).await,
        ServersCommand::Start { name } => start(ctx, &name).await,
        ServersCommand::Check { name } => check(ctx, &name).await,
    }
}

fn target(config: &ServerConfig) -> String {
    if config.transport.is_http() {
        return config.url.clone().unwrap_or_default();
    }
    let mut parts: Vec<&str> = config.command.as_deref().into_iter().collect();
    parts.extend(config.args.iter().map(String::as_str));
    parts.join(" ")
}

fn approval(policy: &AutoApprove) -> String {
    match policy {
        AutoApprove::Flag(true) => "all".to_string(),
        AutoApprove::Flag(false) => "-".to_string(),
        AutoApprove::Tools(tools) => tools.join(","),
    }
}

async fn list(ctx: &CliContext) -> Result<()> {
    ctx.mcp.reload_configs().await?;
    let configs = ctx.mcp.manager().configs().await;
    if configs.is_empty() {
        println!(
            "No servers configured in {}",
            ctx.config.registry_path.display()
        );
        return Ok(());
    }

    let defaults = ctx.mcp.manager().default_servers().await;
    println!(
        "{:<20} {:<16} {:<8} {:<10} {}",
        "NAME", "TRANSPORT", "DEFAULT", "APPROVE", "TARGET"
    );
    print_separator(90);
    for config in &configs {
        let name = if config.disabled {
            format!("{} (off)", config.name)
        } else {
            config.name.clone()
        };
        println!(
            "{:<20} {:<16} {:<8} {:<10} {}",
            truncate_string(&name, 20),
            config.transport,
            if defaults.contains(&config.name) { "yes" } else { "" },
            truncate_string(&approval(&config.auto_approve), 10),
            truncate_string(&target(config), 40)
        );
    }
    if !ctx.mcp.is_enabled() {
        println!();
        println!("Tool servers are globally disabled.");
    }
    Ok(())
}

async fn start(ctx: &CliContext, name: &str) -> Result<()> {
    start_for_call(ctx, name).await?;
    let Some(client) = ctx.mcp.get_client(name).await else {
        anyhow::bail!("{name} stopped right after starting");
    };

    let info = client.server_info().await;
    println!("✓ {name} is {}", client.state().await);
    println!(
        "  server:  {}",
        format_optional(info.as_ref().map(|i| &i.name), "unknown")
    );
    println!(
        "  version: {}",
        format_optional(info.as_ref().and_then(|i| i.version.as_ref()), "unknown")
    );

    let tools = ctx.mcp.list_tools(name).await?;
    println!("  tools:   {}", tools.len());
    Ok(())
}

async fn check(ctx: &CliContext, name: &str) -> Result<()> {
    start_for_call(ctx, name).await?;
    let running = ctx.mcp.is_running(name).await;
    ctx.mcp.stop_server(name).await;
    if running {
        println!("✓ {name} connected and stopped cleanly");
    } else {
        println!("✗ {name} did not stay connected");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_for_stdio_and_http() {
        let stdio = ServerConfig::stdio("files", "npx", vec!["-y".into(), "@acme/files".into()]);
        assert_eq!(target(&stdio), "npx -y @acme/files");

        let http = ServerConfig::streamable_http("remote", "https://tools.example/mcp");
        assert_eq!(target(&http), "https://tools.example/mcp");
    }

    #[test]
    fn test_approval_labels() {
        assert_eq!(approval(&AutoApprove::Flag(true)), "all");
        assert_eq!(
            approval(&AutoApprove::Tools(vec!["read".into(), "list".into()])),
            "read,list"
        );
    }
}
