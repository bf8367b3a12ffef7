//! Main CLI parser and global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for managing tool servers.
#[derive(Parser, Debug)]
#[command(name = "toolbridge")]
#[command(about = "Start, inspect and call Model Context Protocol tool servers")]
#[command(version)]
pub struct Cli {
    /// Data directory (server registry, package cache, repositories)
    #[arg(long = "data-dir", env = "TOOLBRIDGE_DATA_DIR", global = true)]
    pub data_dir: Option<String>,

    /// Server registry file; defaults to `<data-dir>/mcp.json`
    #[arg(long = "config", env = "TOOLBRIDGE_CONFIG", global = true)]
    pub config: Option<String>,

    /// Prefix prepended to repository clone URLs
    #[arg(long = "git-proxy", env = "TOOLBRIDGE_GIT_PROXY", global = true)]
    pub git_proxy: Option<String>,

    /// Use this package registry instead of probing mirrors
    #[arg(long = "registry", env = "TOOLBRIDGE_REGISTRY", global = true)]
    pub registry: Option<String>,

    /// Per-mirror probe timeout in milliseconds
    #[arg(long = "probe-timeout-ms", env = "TOOLBRIDGE_PROBE_TIMEOUT_MS", global = true)]
    pub probe_timeout_ms: Option<u64>,

    /// Network check timeout in milliseconds
    #[arg(long = "network-timeout-ms", env = "TOOLBRIDGE_NETWORK_TIMEOUT_MS", global = true)]
    pub network_timeout_ms: Option<u64>,

    /// Do not pre-install packages when starting servers
    #[arg(long = "no-preinstall", global = true)]
    pub no_preinstall: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "toolbridge",
            "--verbose",
            "--data-dir",
            "/tmp/tb",
            "--no-preinstall",
            "servers",
            "list",
        ]);
        assert!(cli.verbose);
        assert!(cli.no_preinstall);
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/tb"));
    }
}
