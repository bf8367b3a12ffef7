//! Tool server lifecycle management.
//!
//! `McpManager` owns two registries: configurations by name and running
//! clients by name. At most one client exists per name; it is registered
//! before connecting so concurrent starts observe it.

use crate::client::{ClientError, PhraseClassifier, ProtocolClient, SessionErrorClassifier};
use crate::transport::TransportFactory;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use toolbridge_core::{
    AppEvent, AppEventEmitter, ConnectionState, GetPromptResult, McpErrorInfo, McpServiceError,
    Prompt, ReadResourceResult, Resource, ServerConfig, Severity, Tool, ToolCallResult,
};
use toolbridge_install::{PackageCache, package_for_command};

pub struct McpManager {
    configs: RwLock<HashMap<String, ServerConfig>>,
    clients: RwLock<HashMap<String, Arc<ProtocolClient>>>,
    default_servers: RwLock<Vec<String>>,
    factory: Arc<dyn TransportFactory>,
    classifier: Arc<dyn SessionErrorClassifier>,
    emitter: Arc<dyn AppEventEmitter>,
    package_cache: Option<Arc<PackageCache>>,
}

impl McpManager {
    pub fn new(factory: Arc<dyn TransportFactory>, emitter: Arc<dyn AppEventEmitter>) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            default_servers: RwLock::new(Vec::new()),
            factory,
            classifier: Arc::new(PhraseClassifier),
            emitter,
            package_cache: None,
        }
    }

    /// Pre-install packages into `cache` when servers start.
    #[must_use]
    pub fn with_package_cache(mut self, cache: Arc<PackageCache>) -> Self {
        self.package_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn SessionErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    // Configuration registry

    /// Insert or wholesale replace a configuration.
    pub async fn replace_config(&self, config: ServerConfig) {
        self.configs
            .write()
            .await
            .insert(config.name.clone(), config);
    }

    pub async fn remove_config(&self, name: &str) -> Option<ServerConfig> {
        self.configs.write().await.remove(name)
    }

    pub async fn config(&self, name: &str) -> Option<ServerConfig> {
        self.configs.read().await.get(name).cloned()
    }

    pub async fn configs(&self) -> Vec<ServerConfig> {
        let mut configs: Vec<ServerConfig> = self.configs.read().await.values().cloned().collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    pub async fn set_default_servers(&self, names: Vec<String>) {
        *self.default_servers.write().await = names;
    }

    pub async fn default_servers(&self) -> Vec<String> {
        self.default_servers.read().await.clone()
    }

    // Lifecycle

    /// Start a server. No-op if a client already exists for `name`.
    pub async fn start_server(&self, name: &str) -> Result<(), McpServiceError> {
        if self.clients.read().await.contains_key(name) {
            tracing::debug!(server_name = %name, "Already started");
            return Ok(());
        }

        let config = self
            .config(name)
            .await
            .ok_or_else(|| McpServiceError::UnknownServer(name.to_string()))?;
        if config.disabled {
            return Err(McpServiceError::Disabled(name.to_string()));
        }
        config.validate().map_err(McpServiceError::Config)?;

        // Detached: the start path never waits for the install
        let _ = self.spawn_preinstall(&config);

        let client = Arc::new(
            ProtocolClient::new(config, Arc::clone(&self.factory), Arc::clone(&self.emitter))
                .with_classifier(Arc::clone(&self.classifier)),
        );
        {
            let mut clients = self.clients.write().await;
            if clients.contains_key(name) {
                return Ok(());
            }
            clients.insert(name.to_string(), Arc::clone(&client));
        }

        tracing::info!(server_name = %name, "Starting tool server");
        match client.connect().await {
            Ok(()) => {
                if !self.is_registered(name, &client).await {
                    // Stopped while we were connecting
                    tracing::debug!(server_name = %name, "Deregistered during connect, disconnecting");
                    client.disconnect().await;
                }
                Ok(())
            }
            Err(e) => {
                self.deregister_if_same(name, &client).await;
                let error = McpServiceError::StartFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                };
                tracing::error!(server_name = %name, error = %e, "Failed to start tool server");
                self.emitter.emit(AppEvent::notification(
                    format!("Failed to start {name}"),
                    error.to_string(),
                    Severity::Error,
                ));
                self.emitter
                    .emit(AppEvent::mcp_server_error(McpErrorInfo::from_error(name, &error)));
                Err(error)
            }
        }
    }

    /// Deregister and disconnect. No-op when nothing is running.
    pub async fn stop_server(&self, name: &str) {
        let client = self.clients.write().await.remove(name);
        if let Some(client) = client {
            tracing::info!(server_name = %name, "Stopping tool server");
            client.disconnect().await;
        }
    }

    pub async fn stop_all(&self) {
        let clients: Vec<Arc<ProtocolClient>> =
            self.clients.write().await.drain().map(|(_, c)| c).collect();
        for client in clients {
            client.disconnect().await;
        }
    }

    /// Kick off package pre-installation for `npx`/`bunx` servers.
    pub fn spawn_preinstall(&self, config: &ServerConfig) -> Option<JoinHandle<bool>> {
        let cache = Arc::clone(self.package_cache.as_ref()?);
        let package = package_for_command(config.command.as_deref()?, &config.args)?;
        let server_name = config.name.clone();

        Some(tokio::spawn(async move {
            let installed = cache.smart_install(&package).await;
            tracing::debug!(server_name = %server_name, package = %package, installed, "Pre-install finished");
            installed
        }))
    }

    // Queries (never start anything)

    pub async fn is_running(&self, name: &str) -> bool {
        match self.get_client(name).await {
            Some(client) => client.is_connected().await,
            None => false,
        }
    }

    pub async fn get_client(&self, name: &str) -> Option<Arc<ProtocolClient>> {
        self.clients.read().await.get(name).cloned()
    }

    pub async fn running_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Clients of default servers that already exist.
    pub async fn default_clients(&self) -> Vec<Arc<ProtocolClient>> {
        let defaults = self.default_servers().await;
        let clients = self.clients.read().await;
        defaults
            .iter()
            .filter_map(|name| clients.get(name).cloned())
            .collect()
    }

    pub async fn is_auto_approved(&self, server: &str, tool: &str) -> bool {
        self.configs
            .read()
            .await
            .get(server)
            .is_some_and(|c| c.auto_approve.allows(tool))
    }

    // Protocol operations

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpServiceError> {
        let client = self.running_client(server).await?;
        let result = client.call_tool(tool, arguments).await;
        self.finish(server, &client, result).await
    }

    pub async fn list_tools(&self, server: &str) -> Result<Vec<Tool>, McpServiceError> {
        let client = self.running_client(server).await?;
        let result = client.list_tools().await;
        self.finish(server, &client, result).await
    }

    pub async fn list_prompts(&self, server: &str) -> Result<Vec<Prompt>, McpServiceError> {
        let client = self.running_client(server).await?;
        let result = client.list_prompts().await;
        self.finish(server, &client, result).await
    }

    pub async fn list_resources(&self, server: &str) -> Result<Vec<Resource>, McpServiceError> {
        let client = self.running_client(server).await?;
        let result = client.list_resources().await;
        self.finish(server, &client, result).await
    }

    pub async fn get_prompt(
        &self,
        server: &str,
        prompt: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, McpServiceError> {
        let client = self.running_client(server).await?;
        let result = client.get_prompt(prompt, arguments).await;
        self.finish(server, &client, result).await
    }

    pub async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<ReadResourceResult, McpServiceError> {
        let client = self.running_client(server).await?;
        let result = client.read_resource(uri).await;
        self.finish(server, &client, result).await
    }

    async fn running_client(&self, name: &str) -> Result<Arc<ProtocolClient>, McpServiceError> {
        self.get_client(name)
            .await
            .ok_or_else(|| McpServiceError::NotRunning(name.to_string()))
    }

    /// Map client errors; a client that ended up stopped is dropped from the registry.
    async fn finish<T>(
        &self,
        name: &str,
        client: &Arc<ProtocolClient>,
        result: Result<T, ClientError>,
    ) -> Result<T, McpServiceError> {
        let e = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        tracing::warn!(server_name = %name, error = %e, "Tool server operation failed");

        let error = match e {
            ClientError::Stopped(_) => McpServiceError::Stopped {
                name: name.to_string(),
                reason: e.to_string(),
            },
            _ => McpServiceError::Client {
                name: name.to_string(),
                reason: e.to_string(),
            },
        };
        if client.state().await == ConnectionState::Stopped {
            self.deregister_if_same(name, client).await;
            self.emitter
                .emit(AppEvent::mcp_server_error(McpErrorInfo::from_error(name, &error)));
        }
        Err(error)
    }

    async fn is_registered(&self, name: &str, client: &Arc<ProtocolClient>) -> bool {
        self.clients
            .read()
            .await
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, client))
    }

    async fn deregister_if_same(&self, name: &str, client: &Arc<ProtocolClient>) {
        let mut clients = self.clients.write().await;
        if clients
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, client))
        {
            clients.remove(name);
        }
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager").finish_non_exhaustive()
    }
}
