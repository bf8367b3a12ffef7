//! Collaborator-facing tool server service.
//!
//! `McpService` loads configurations from a [`ServerConfigSource`], owns the
//! [`McpManager`], and exposes package cache and repository operations.

use crate::client::ProtocolClient;
use crate::manager::McpManager;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use toolbridge_core::settings::DEFAULT_NETWORK_CHECK_TIMEOUT_MS;
use toolbridge_core::{
    GetPromptResult, McpServiceError, Prompt, ReadResourceResult, Resource, ServerConfig,
    ServerConfigSource, Tool, ToolCallResult,
};
use toolbridge_install::{
    CacheStats, CachedPackage, PackageCache, ProbeReport, RegistrySelection, RepositoryDownload,
    RepositoryFetcher, check_network_connection,
};

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "py"];

/// Summary of a configuration refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub loaded: usize,
    pub removed: Vec<String>,
    /// Running servers stopped because their configuration changed.
    pub restarted: Vec<String>,
}

pub struct McpService {
    source: Arc<dyn ServerConfigSource>,
    manager: Arc<McpManager>,
    package_cache: Arc<PackageCache>,
    fetcher: Arc<RepositoryFetcher>,
    /// Configs exactly as the source returned them. The manager may hold a
    /// checkout-rewritten copy, so change detection compares against these.
    loaded: RwLock<HashMap<String, ServerConfig>>,
    enabled: AtomicBool,
    network_timeout: Duration,
}

impl McpService {
    pub fn new(
        source: Arc<dyn ServerConfigSource>,
        manager: Arc<McpManager>,
        package_cache: Arc<PackageCache>,
        fetcher: Arc<RepositoryFetcher>,
    ) -> Self {
        Self {
            source,
            manager,
            package_cache,
            fetcher,
            loaded: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(true),
            network_timeout: Duration::from_millis(DEFAULT_NETWORK_CHECK_TIMEOUT_MS),
        }
    }

    #[must_use]
    pub const fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn manager(&self) -> &Arc<McpManager> {
        &self.manager
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Load configurations and start the default servers.
    ///
    /// Individual start failures are logged and do not fail initialization.
    pub async fn initialize(&self) -> Result<(), McpServiceError> {
        self.reload_configs().await?;
        if !self.is_enabled() {
            tracing::info!("Tool servers disabled, skipping default servers");
            return Ok(());
        }

        for name in self.manager.default_servers().await {
            if let Err(e) = self.start_server(&name).await {
                tracing::warn!(server_name = %name, error = %e, "Failed to start default server");
            }
        }
        Ok(())
    }

    /// Refresh configurations from the source.
    ///
    /// Removed servers are stopped; running servers whose configuration
    /// changed are restarted with the new one.
    pub async fn reload_configs(&self) -> Result<ReloadSummary, McpServiceError> {
        let registry = self.source.load().await?;
        let incoming: HashMap<String, ServerConfig> = registry
            .servers
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        let mut summary = ReloadSummary {
            loaded: incoming.len(),
            ..ReloadSummary::default()
        };

        let previous = self.loaded.read().await.clone();
        for existing in self.manager.configs().await {
            let name = existing.name.clone();
            let baseline = previous.get(&name).unwrap_or(&existing);
            match incoming.get(&name) {
                None => {
                    self.manager.stop_server(&name).await;
                    self.manager.remove_config(&name).await;
                    summary.removed.push(name);
                }
                Some(updated) if updated != baseline => {
                    if self.manager.get_client(&name).await.is_some() {
                        self.manager.stop_server(&name).await;
                        summary.restarted.push(name.clone());
                    }
                    self.manager.replace_config(updated.clone()).await;
                }
                Some(_) => {}
            }
        }

        for config in incoming.values() {
            if self.manager.config(&config.name).await.is_none() {
                self.manager.replace_config(config.clone()).await;
            }
        }
        *self.loaded.write().await = incoming;
        self.manager.set_default_servers(registry.default_servers).await;
        self.enabled.store(registry.enabled, Ordering::SeqCst);

        if registry.enabled {
            for name in &summary.restarted {
                if let Err(e) = self.start_server(name).await {
                    tracing::warn!(server_name = %name, error = %e, "Restart after config change failed");
                }
            }
        }

        tracing::info!(
            loaded = summary.loaded,
            removed = summary.removed.len(),
            restarted = summary.restarted.len(),
            "Tool server configuration reloaded"
        );
        Ok(summary)
    }

    /// Start a server, fetching its repository first when it has one.
    pub async fn start_server(&self, name: &str) -> Result<(), McpServiceError> {
        if !self.is_enabled() {
            return Err(McpServiceError::Config(
                "tool servers are disabled".to_string(),
            ));
        }
        if self.manager.get_client(name).await.is_some() {
            return Ok(());
        }

        let as_loaded = self.loaded.read().await.get(name).cloned();
        let config = match as_loaded {
            Some(config) => config,
            None => self
                .manager
                .config(name)
                .await
                .ok_or_else(|| McpServiceError::UnknownServer(name.to_string()))?,
        };
        if config.repository.is_some() && !config.disabled {
            let prepared = self.prepare_repository(config).await?;
            self.manager.replace_config(prepared).await;
        }

        self.manager.start_server(name).await
    }

    pub async fn stop_server(&self, name: &str) {
        self.manager.stop_server(name).await;
    }

    pub async fn shutdown(&self) {
        self.manager.stop_all().await;
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.manager.is_running(name).await
    }

    pub async fn get_client(&self, name: &str) -> Option<Arc<ProtocolClient>> {
        self.manager.get_client(name).await
    }

    pub async fn list_tools(&self, server: &str) -> Result<Vec<Tool>, McpServiceError> {
        self.manager.list_tools(server).await
    }

    pub async fn list_prompts(&self, server: &str) -> Result<Vec<Prompt>, McpServiceError> {
        self.manager.list_prompts(server).await
    }

    pub async fn list_resources(&self, server: &str) -> Result<Vec<Resource>, McpServiceError> {
        self.manager.list_resources(server).await
    }

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpServiceError> {
        self.manager.call_tool(server, tool, arguments).await
    }

    pub async fn get_prompt(
        &self,
        server: &str,
        prompt: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, McpServiceError> {
        self.manager.get_prompt(server, prompt, arguments).await
    }

    pub async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<ReadResourceResult, McpServiceError> {
        self.manager.read_resource(server, uri).await
    }

    pub async fn is_auto_approved(&self, server: &str, tool: &str) -> bool {
        self.manager.is_auto_approved(server, tool).await
    }

    /// Fastest registry mirror (measured once, then cached).
    pub async fn test_registry_speed(&self) -> RegistrySelection {
        self.package_cache.prober().fastest().await
    }

    /// Fresh latency report for every mirror.
    pub async fn measure_registries(&self) -> Vec<ProbeReport> {
        self.package_cache.prober().measure_all().await
    }

    // Package cache

    pub fn clear_cache(&self) -> Result<usize, McpServiceError> {
        self.package_cache
            .clear_cache()
            .map_err(|e| McpServiceError::Install(e.to_string()))
    }

    pub fn cache_stats(&self) -> Result<CacheStats, McpServiceError> {
        self.package_cache
            .cache_stats()
            .map_err(|e| McpServiceError::Install(e.to_string()))
    }

    /// Reachability of `url`, or of the fastest registry mirror when `None`.
    pub async fn check_network_connection(&self, url: Option<&str>) -> bool {
        let target = match url {
            Some(url) => url.to_string(),
            None => self.package_cache.prober().fastest_url().await,
        };
        check_network_connection(&target, self.network_timeout).await
    }

    pub fn is_package_cached(&self, package: &str) -> bool {
        self.package_cache.is_cached(package)
    }

    /// Install into the cache from `registry`, or the fastest mirror when `None`.
    pub async fn install_package_to_cache(
        &self,
        package: &str,
        registry: Option<&str>,
    ) -> Result<CachedPackage, McpServiceError> {
        let registry = match registry {
            Some(r) => r.to_string(),
            None => self.package_cache.prober().fastest_url().await,
        };
        self.package_cache
            .install_to_cache(package, &registry)
            .await
            .map_err(|e| McpServiceError::Install(e.to_string()))
    }

    // Repositories

    pub async fn download_repository(
        &self,
        url: &str,
        target_name: Option<&str>,
        args: &[String],
        label: Option<&str>,
    ) -> Result<RepositoryDownload, McpServiceError> {
        self.fetcher
            .download(url, target_name, args, label)
            .await
            .map_err(|e| McpServiceError::Install(e.to_string()))
    }

    /// Fetch the repository and point the config at the checkout.
    async fn prepare_repository(&self, config: ServerConfig) -> Result<ServerConfig, McpServiceError> {
        let Some(origin) = config.repository.clone() else {
            return Ok(config);
        };
        let label = origin.label.as_deref().unwrap_or(&config.name);
        let download = self
            .download_repository(&origin.url, origin.target_name.as_deref(), &config.args, Some(label))
            .await?;

        let mut prepared = config;
        prepared.working_dir = Some(download.workspace.to_string_lossy().into_owned());
        prepared.args = launch_args(&prepared.args, &download.entry_file);
        Ok(prepared)
    }
}

/// Put the resolved entry file where the script argument goes.
fn launch_args(args: &[String], entry_file: &str) -> Vec<String> {
    let Some(first) = args.first() else {
        return vec![entry_file.to_string()];
    };
    let is_script = Path::new(first)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e));

    if is_script {
        std::iter::once(entry_file.to_string())
            .chain(args.iter().skip(1).cloned())
            .collect()
    } else {
        args.to_vec()
    }
}
