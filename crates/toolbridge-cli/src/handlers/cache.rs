//! Package cache commands.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::commands::CacheCommand;
use crate::presentation::{format_optional, spinner};

pub async fn execute(ctx: &CliContext, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Stats => stats(ctx),
        CacheCommand::Clear => {
            let removed = ctx.mcp.clear_cache()?;
            println!("✓ Removed {removed} cached package(s)");
            Ok(())
        }
        CacheCommand::Check { package } => {
            if ctx.mcp.is_package_cached(&package) {
                println!("{package} is cached");
            } else {
                println!("{package} is not cached");
            }
            Ok(())
        }
        CacheCommand::Install { package, registry } => {
            install(ctx, &package, registry.as_deref()).await
        }
    }
}

fn stats(ctx: &CliContext) -> Result<()> {
    let stats = ctx.mcp.cache_stats()?;
    println!("Packages: {}", stats.package_count);
    println!("Size:     {}", format_bytes(stats.total_bytes));
    for package in &stats.packages {
        println!("  - {package}");
    }
    Ok(())
}

async fn install(ctx: &CliContext, package: &str, registry: Option<&str>) -> Result<()> {
    let bar = spinner(format!("Installing {package}"));
    let result = ctx.mcp.install_package_to_cache(package, registry).await;
    bar.finish_and_clear();

    let cached = result?;
    println!(
        "✓ {} {} from {}",
        cached.package,
        format_optional(cached.version.as_ref(), ""),
        cached.registry
    );
    println!("  dir: {}", cached.install_dir.display());
    for (name, path) in &cached.bin {
        println!("  bin: {name} -> {}", path.display());
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
