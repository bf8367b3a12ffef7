//! CLI bootstrap - the composition root.
//!
//! The only place where infrastructure is wired together:
//! - server registry file (via `JsonFileConfigSource`)
//! - command resolver, credentials and transport factory
//! - package cache, registry prober and repository fetcher
//! - `McpManager` and `McpService`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use toolbridge_core::paths::{
    data_root_with, normalize_user_path, package_cache_dir, registry_file_path, repositories_dir,
    runtimes_dir,
};
use toolbridge_core::{
    AppEventEmitter, ChannelEmitter, EnvCredentialSource, JsonFileConfigSource, Settings,
    validate_settings,
};
use toolbridge_install::{
    HttpNetworkCheck, HttpProbe, PackageCache, RegistryProber, RepositoryFetcher, SystemRunner,
};
use toolbridge_mcp::{
    CommandResolver, DefaultTransportFactory, InProcessRegistry, McpManager, McpService,
};

use crate::error::CliError;
use crate::parser::Cli;

/// Resolved locations and settings for one invocation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_root: PathBuf,
    pub registry_path: PathBuf,
    pub settings: Settings,
}

impl CliConfig {
    /// Build from global flags (which already fold in their env vars).
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let data_root = data_root_with(cli.data_dir.clone())?;
        let registry_path = match cli.config.as_deref() {
            Some(path) => normalize_user_path(path)?,
            None => registry_file_path(&data_root),
        };

        let mut settings = Settings::with_defaults();
        settings.git_proxy.clone_from(&cli.git_proxy);
        settings.registry.clone_from(&cli.registry);
        if cli.probe_timeout_ms.is_some() {
            settings.probe_timeout_ms = cli.probe_timeout_ms;
        }
        if cli.network_timeout_ms.is_some() {
            settings.network_check_timeout_ms = cli.network_timeout_ms;
        }
        if cli.no_preinstall {
            settings.preinstall_packages = Some(false);
        }
        validate_settings(&settings)?;

        Ok(Self {
            data_root,
            registry_path,
            settings,
        })
    }
}

/// Fully composed context for command handlers.
pub struct CliContext {
    pub mcp: Arc<McpService>,
    /// Subscribe here to observe status, list and install events.
    pub events: ChannelEmitter,
    pub config: CliConfig,
}

fn registry_prober(settings: &Settings) -> RegistryProber {
    if let Some(registry) = settings.registry.as_deref() {
        return RegistryProber::fixed(registry);
    }
    let timeout = Duration::from_millis(settings.effective_probe_timeout_ms());
    RegistryProber::new(
        settings.registry_mirrors.clone().unwrap_or_default(),
        Arc::new(HttpProbe::new()),
        timeout,
    )
}

/// Wire everything for the given configuration.
pub fn bootstrap(config: CliConfig) -> CliContext {
    let settings = &config.settings;
    let events = ChannelEmitter::default();
    let emitter: Arc<dyn AppEventEmitter> = Arc::new(events.clone());
    let runner = Arc::new(SystemRunner);
    let network_timeout = Duration::from_millis(settings.effective_network_check_timeout_ms());

    let cache = Arc::new(PackageCache::new(
        package_cache_dir(&config.data_root),
        runner.clone(),
        Arc::new(registry_prober(settings)),
        Arc::new(HttpNetworkCheck::new(network_timeout)),
        Arc::clone(&emitter),
    ));
    let fetcher = Arc::new(
        RepositoryFetcher::new(
            repositories_dir(&config.data_root),
            runner,
            Arc::clone(&emitter),
        )
        .with_git_proxy(settings.effective_git_proxy().map(str::to_string)),
    );

    let resolver = CommandResolver::system().with_runtime_root(runtimes_dir(&config.data_root));
    let factory = DefaultTransportFactory::new(
        resolver,
        Arc::new(EnvCredentialSource::from_host()),
        Arc::new(InProcessRegistry::new()),
    );

    let mut manager = McpManager::new(Arc::new(factory), Arc::clone(&emitter));
    if settings.effective_preinstall() {
        manager = manager.with_package_cache(Arc::clone(&cache));
    }

    let source = Arc::new(JsonFileConfigSource::new(config.registry_path.clone()));
    let mcp = McpService::new(source, Arc::new(manager), cache, fetcher)
        .with_network_timeout(network_timeout);

    tracing::debug!(
        data_root = %config.data_root.display(),
        registry = %config.registry_path.display(),
        "CLI context ready"
    );

    CliContext {
        mcp: Arc::new(mcp),
        events,
        config,
    }
}
