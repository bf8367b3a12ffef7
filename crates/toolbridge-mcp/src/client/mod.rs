//! Protocol client for one tool server.
//!
//! `ProtocolClient` owns the transport for a single server and drives the
//! connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Recovering -> Connected | Stopped
//! ```
//!
//! Every operation starts with an explicit connection guard. Failures are
//! classified by a [`SessionErrorClassifier`]: unsupported surfaces are cached
//! as empty, an expired session triggers exactly one transport rebuild and
//! retry, and anything else propagates.

mod cache;
mod classifier;

pub use cache::ListCache;
pub use classifier::{ErrorClass, PhraseClassifier, SessionErrorClassifier};

use crate::jsonrpc::{JsonRpcNotification, PROTOCOL_VERSION};
use crate::peer::{PeerError, RpcPeer};
use crate::transport::{TransportError, TransportFactory};
use cache::ListCaches;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use toolbridge_core::{
    AppEvent, AppEventEmitter, ConnectionState, GetPromptResult, ListKind, Prompt,
    ReadResourceResult, Resource, ServerConfig, Tool, ToolCallResult,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to '{server}': {source}")]
    ConnectFailed {
        server: String,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Handshake timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Server '{0}' stopped after repeated session errors")]
    Stopped(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<PeerError> for ClientError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::Transport(t) => Self::Transport(t),
            PeerError::Rpc(err) => Self::Rpc {
                code: err.code,
                message: err.message,
            },
            PeerError::Closed => Self::Transport(TransportError::Closed),
            PeerError::Malformed(m) => Self::Protocol(m),
        }
    }
}

/// Server identity reported by `initialize`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    server_info: Option<ServerInfo>,
}

pub struct ProtocolClient {
    config: ServerConfig,
    factory: Arc<dyn TransportFactory>,
    classifier: Arc<dyn SessionErrorClassifier>,
    emitter: Arc<dyn AppEventEmitter>,
    state: RwLock<ConnectionState>,
    peer: RwLock<Option<Arc<RpcPeer>>>,
    connect_lock: Mutex<()>,
    caches: Arc<ListCaches>,
    server_info: RwLock<Option<ServerInfo>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    is_recovering: AtomicBool,
    has_restarted_once: AtomicBool,
}

impl ProtocolClient {
    pub fn new(
        config: ServerConfig,
        factory: Arc<dyn TransportFactory>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        Self {
            config,
            factory,
            classifier: Arc::new(PhraseClassifier),
            emitter,
            state: RwLock::new(ConnectionState::Disconnected),
            peer: RwLock::new(None),
            connect_lock: Mutex::new(()),
            caches: Arc::default(),
            server_info: RwLock::new(None),
            listener: Mutex::new(None),
            is_recovering: AtomicBool::new(false),
            has_restarted_once: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn SessionErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    pub fn is_recovering(&self) -> bool {
        self.is_recovering.load(Ordering::SeqCst)
    }

    pub fn has_restarted_once(&self) -> bool {
        self.has_restarted_once.load(Ordering::SeqCst)
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Build the transport and perform the handshake. No-op when connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;
        if self.state().await == ConnectionState::Connected && self.peer.read().await.is_some() {
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting).await;
        self.open_locked().await
    }

    /// Close the transport and clear caches. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.teardown().await;
        self.set_state(ConnectionState::Stopped).await;
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, ClientError> {
        self.list(ListKind::Tools, &self.caches.tools, "tools/list", "tools")
            .await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, ClientError> {
        self.list(ListKind::Prompts, &self.caches.prompts, "prompts/list", "prompts")
            .await
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, ClientError> {
        self.list(
            ListKind::Resources,
            &self.caches.resources,
            "resources/list",
            "resources",
        )
        .await
    }

    /// Invoke a tool. A result flagged `isError` is returned as data.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, ClientError> {
        let params = json!({ "name": name, "arguments": arguments });
        self.typed_request("tools/call", params).await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, ClientError> {
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = arguments;
        }
        self.typed_request("prompts/get", params).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        self.typed_request("resources/read", json!({ "uri": uri }))
            .await
    }

    async fn typed_request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ClientError> {
        let value = self
            .with_recovery(|peer| {
                let params = params.clone();
                async move { Ok(peer.request(method, Some(params)).await?) }
            })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Protocol(format!("invalid {method} result: {e}")))
    }

    async fn list<T>(
        &self,
        kind: ListKind,
        cache: &RwLock<ListCache<T>>,
        method: &'static str,
        field: &'static str,
    ) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned + Clone + Send + Sync,
    {
        self.ensure_connected().await?;
        if let Some(items) = cache.read().await.cached() {
            return Ok(items);
        }

        let result = self
            .with_recovery(|peer| async move { Ok(peer.request(method, None).await?) })
            .await;

        match result {
            Ok(value) => {
                let items: Vec<T> = value
                    .get(field)
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| ClientError::Protocol(format!("invalid {method} result: {e}")))?
                    .unwrap_or_default();
                *cache.write().await = ListCache::Populated(items.clone());
                Ok(items)
            }
            Err(e) if self.classifier.classify(&e) == ErrorClass::Unsupported => {
                tracing::debug!(server_name = %self.config.name, kind = %kind, error = %e, "Surface unsupported, caching empty");
                *cache.write().await = ListCache::KnownEmpty;
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_connected(&self) -> Result<(), ClientError> {
        match self.state().await {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Stopped => Err(ClientError::Stopped(self.config.name.clone())),
            _ => self.connect().await,
        }
    }

    async fn current_peer(&self) -> Result<Arc<RpcPeer>, ClientError> {
        self.peer
            .read()
            .await
            .clone()
            .ok_or_else(|| ClientError::Stopped(self.config.name.clone()))
    }

    /// Run `op`, rebuilding the session once if the server forgot it.
    async fn with_recovery<F, Fut>(&self, op: F) -> Result<Value, ClientError>
    where
        F: Fn(Arc<RpcPeer>) -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        self.ensure_connected().await?;
        let peer = self.current_peer().await?;

        let error = match op(Arc::clone(&peer)).await {
            Ok(value) => {
                self.has_restarted_once.store(false, Ordering::SeqCst);
                return Ok(value);
            }
            Err(e) => e,
        };

        if self.classifier.classify(&error) != ErrorClass::SessionExpired {
            return Err(error);
        }
        if self.has_restarted_once.load(Ordering::SeqCst) {
            return Err(self.stop_after_session_error(&error).await);
        }

        tracing::warn!(server_name = %self.config.name, error = %error, "Session expired, reconnecting");
        self.recover(&peer).await?;

        let peer = self.current_peer().await?;
        match op(peer).await {
            Ok(value) => {
                self.has_restarted_once.store(false, Ordering::SeqCst);
                Ok(value)
            }
            Err(e) if self.classifier.classify(&e) == ErrorClass::SessionExpired => {
                Err(self.stop_after_session_error(&e).await)
            }
            Err(e) => Err(e),
        }
    }

    async fn recover(&self, failed: &Arc<RpcPeer>) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;

        // Another caller already rebuilt the session
        if let Some(current) = self.peer.read().await.as_ref() {
            if !Arc::ptr_eq(current, failed) {
                return Ok(());
            }
        }

        self.is_recovering.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Recovering).await;
        self.teardown().await;
        self.has_restarted_once.store(true, Ordering::SeqCst);

        let result = self.open_locked().await;
        self.is_recovering.store(false, Ordering::SeqCst);
        result
    }

    async fn stop_after_session_error(&self, error: &ClientError) -> ClientError {
        tracing::error!(server_name = %self.config.name, error = %error, "Session lost again after restart, stopping");
        self.disconnect().await;
        ClientError::Stopped(self.config.name.clone())
    }

    /// Open a transport and handshake. Caller holds `connect_lock`.
    async fn open_locked(&self) -> Result<(), ClientError> {
        let limit = self.config.handshake_timeout();
        let outcome = match tokio::time::timeout(limit, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(limit)),
        };

        match outcome {
            Ok((peer, listener)) => {
                *self.peer.write().await = Some(peer);
                *self.listener.lock().await = Some(listener);
                self.set_state(ConnectionState::Connected).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(server_name = %self.config.name, error = %e, "Connect failed");
                self.teardown().await;
                self.set_state(ConnectionState::Stopped).await;
                Err(ClientError::ConnectFailed {
                    server: self.config.name.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn handshake(&self) -> Result<(Arc<RpcPeer>, JoinHandle<()>), ClientError> {
        let transport = self.factory.build(&self.config).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(RpcPeer::new(transport, Some(tx)));

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "toolbridge",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let init = async {
            let value = peer.request("initialize", Some(params)).await?;
            peer.notify("notifications/initialized", None).await?;
            Ok::<_, ClientError>(value)
        };
        let value = match init.await {
            Ok(value) => value,
            Err(e) => {
                peer.close().await;
                return Err(e);
            }
        };

        let init: InitializeResult = serde_json::from_value(value).unwrap_or_default();
        tracing::info!(
            server_name = %self.config.name,
            server = ?init.server_info.as_ref().map(|s| &s.name),
            protocol = ?init.protocol_version,
            "Connected"
        );
        *self.server_info.write().await = init.server_info;

        let listener = tokio::spawn(listen_for_changes(
            rx,
            Arc::clone(&self.caches),
            Arc::clone(&self.emitter),
            self.config.name.clone(),
        ));
        Ok((peer, listener))
    }

    async fn teardown(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
        }
        let peer = self.peer.write().await.take();
        if let Some(peer) = peer {
            peer.close().await;
        }
        self.caches.clear().await;
    }

    /// Update state; emits only on an actual transition.
    async fn set_state(&self, next: ConnectionState) {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            tracing::debug!(server_name = %self.config.name, from = %previous, to = %next, "State changed");
            self.emitter
                .emit(AppEvent::status_changed(self.config.name.clone(), next));
        }
    }
}

async fn listen_for_changes(
    mut notifications: mpsc::UnboundedReceiver<JsonRpcNotification>,
    caches: Arc<ListCaches>,
    emitter: Arc<dyn AppEventEmitter>,
    server_name: String,
) {
    while let Some(notification) = notifications.recv().await {
        if let Some(kind) = ListKind::from_notification(&notification.method) {
            tracing::debug!(server_name = %server_name, kind = %kind, "List changed");
            caches.invalidate(kind).await;
            emitter.emit(AppEvent::list_changed(server_name.clone(), kind));
        }
    }
}
