//! Dependency acquisition for tool servers.
//!
//! - `cache` - isolated, name-keyed package installs that survive restarts
//! - `registry` - concurrent mirror probing with a cached winner
//! - `network` - bounded reachability check
//! - `repository` - clone/update of remote repositories plus dependency install
//! - `runner` - streamed subprocess execution shared by the above

pub mod cache;
pub mod network;
pub mod registry;
pub mod repository;
pub mod runner;

pub use cache::{CacheError, CacheStats, CachedPackage, PackageCache, package_for_command};
pub use network::{HttpNetworkCheck, NetworkCheck, check_network_connection};
pub use registry::{
    DEFAULT_MIRRORS, HttpProbe, PROBE_PACKAGE, ProbeError, ProbeReport, RegistryProbe, RegistryProber,
    RegistrySelection,
};
pub use repository::{
    PackageManager, RepositoryDownload, RepositoryError, RepositoryFetcher, RepositorySpec,
};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, LineSink, RunnerError, SystemRunner};
