//! Tool, prompt and resource commands.

use anyhow::Result;
use serde_json::Value;

use super::start_for_call;
use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{format_optional, print_json, print_separator, truncate_string};

/// Parse a JSON object argument.
pub(crate) fn parse_arguments(raw: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CliError::Arguments(
            "arguments must be a JSON object".to_string(),
        ))
    }
}

pub async fn tools(ctx: &CliContext, server: &str) -> Result<()> {
    start_for_call(ctx, server).await?;
    let tools = ctx.mcp.list_tools(server).await?;
    if tools.is_empty() {
        println!("{server} exposes no tools");
        return Ok(());
    }

    println!("{:<30} {:<10} {}", "TOOL", "APPROVED", "DESCRIPTION");
    print_separator(90);
    for tool in &tools {
        let approved = ctx.mcp.is_auto_approved(server, &tool.name).await;
        println!(
            "{:<30} {:<10} {}",
            truncate_string(&tool.name, 30),
            if approved { "yes" } else { "" },
            truncate_string(&format_optional(tool.description.as_ref(), ""), 50)
        );
    }
    Ok(())
}

pub async fn call(ctx: &CliContext, server: &str, tool: &str, args: &str) -> Result<()> {
    let arguments = parse_arguments(args)?;
    start_for_call(ctx, server).await?;
    let result = ctx.mcp.call_tool(server, tool, arguments).await?;
    print_json(&result);
    if result.is_error {
        anyhow::bail!("{tool} reported an error");
    }
    Ok(())
}

pub async fn prompts(ctx: &CliContext, server: &str) -> Result<()> {
    start_for_call(ctx, server).await?;
    let prompts = ctx.mcp.list_prompts(server).await?;
    if prompts.is_empty() {
        println!("{server} exposes no prompts");
        return Ok(());
    }
    for prompt in &prompts {
        let args: Vec<String> = prompt
            .arguments
            .iter()
            .map(|a| {
                if a.required {
                    a.name.clone()
                } else {
                    format!("[{}]", a.name)
                }
            })
            .collect();
        println!(
            "{} {}  {}",
            prompt.name,
            args.join(" "),
            format_optional(prompt.description.as_ref(), "")
        );
    }
    Ok(())
}

pub async fn prompt(
    ctx: &CliContext,
    server: &str,
    prompt: &str,
    args: Option<&str>,
) -> Result<()> {
    let arguments = args.map(parse_arguments).transpose()?;
    start_for_call(ctx, server).await?;
    let result = ctx.mcp.get_prompt(server, prompt, arguments).await?;
    print_json(&result);
    Ok(())
}

pub async fn resources(ctx: &CliContext, server: &str) -> Result<()> {
    start_for_call(ctx, server).await?;
    let resources = ctx.mcp.list_resources(server).await?;
    if resources.is_empty() {
        println!("{server} exposes no resources");
        return Ok(());
    }
    println!("{:<40} {:<24} {}", "URI", "NAME", "TYPE");
    print_separator(90);
    for resource in &resources {
        println!(
            "{:<40} {:<24} {}",
            truncate_string(&resource.uri, 40),
            truncate_string(&resource.name, 24),
            format_optional(resource.mime_type.as_ref(), "-")
        );
    }
    Ok(())
}

pub async fn read(ctx: &CliContext, server: &str, uri: &str) -> Result<()> {
    start_for_call(ctx, server).await?;
    let result = ctx.mcp.read_resource(server, uri).await?;
    print_json(&result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse_arguments(r#"{"path": "/tmp"}"#).unwrap()["path"],
            "/tmp"
        );
        assert!(matches!(
            parse_arguments("[1, 2]"),
            Err(CliError::Arguments(_))
        ));
        assert!(matches!(parse_arguments("{"), Err(CliError::Arguments(_))));
    }
}
