//! Repository download command.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{format_optional, spinner};

pub async fn execute(
    ctx: &CliContext,
    url: &str,
    target_name: Option<&str>,
    label: Option<&str>,
    args: &[String],
) -> Result<()> {
    let bar = spinner(format!("Fetching {}", label.unwrap_or(url)));
    let result = ctx
        .mcp
        .download_repository(url, target_name, args, label)
        .await;
    bar.finish_and_clear();

    let download = result?;
    println!("✓ Workspace: {}", download.workspace.display());
    println!("  entry:   {}", download.entry_file);
    println!(
        "  deps:    {}",
        format_optional(download.package_manager.as_ref(), "none")
    );
    Ok(())
}
