//! Subcommand definitions.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show resolved data paths
    Paths,

    /// Manage configured servers
    Servers {
        #[command(subcommand)]
        command: ServersCommand,
    },

    /// Start the default servers and stream events until Ctrl+C
    Run,

    /// List the tools a server exposes
    Tools {
        server: String,
    },

    /// Call a tool
    Call {
        server: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List the prompt templates a server exposes
    Prompts {
        server: String,
    },

    /// Render a prompt template
    Prompt {
        server: String,
        prompt: String,
        /// Prompt arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// List the resources a server exposes
    Resources {
        server: String,
    },

    /// Read a resource by URI
    Read {
        server: String,
        uri: String,
    },

    /// Manage the local package cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Inspect package registry mirrors
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },

    /// Check whether a URL (or the selected registry) is reachable
    Network {
        #[arg(long)]
        url: Option<String>,
    },

    /// Clone or update a repository and install its dependencies
    Download {
        url: String,
        /// Directory name under the owner directory
        #[arg(long = "target-name")]
        target_name: Option<String>,
        /// Label shown in progress output
        #[arg(long)]
        label: Option<String>,
        /// Launch arguments used to pick the entry file
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServersCommand {
    /// List configured servers
    List,
    /// Start a server and report its state
    Start { name: String },
    /// Start then stop a server, reporting whether it connected
    Check { name: String },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cached packages and disk usage
    Stats,
    /// Remove every cached package
    Clear,
    /// Whether a package is cached
    Check { package: String },
    /// Install a package into the cache
    Install {
        package: String,
        /// Registry URL; the fastest mirror when omitted
        #[arg(long)]
        registry: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RegistryCommand {
    /// Pick the fastest mirror
    Fastest,
    /// Probe every mirror and print latencies
    Measure,
}
