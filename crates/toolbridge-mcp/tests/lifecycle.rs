//! Manager lifecycle behavior against in-process servers.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolbridge_core::{
    AppEvent, AppEventEmitter, ChannelEmitter, ConnectionState, ListKind, McpServiceError,
    NoopEmitter, ServerConfig,
};
use toolbridge_mcp::jsonrpc::{JsonRpcError, JsonRpcMessage, PROTOCOL_VERSION};
use toolbridge_mcp::transport::{LinkedTransport, serve_linked};
use toolbridge_mcp::{InProcessHandler, McpManager, Transport, TransportError, TransportFactory};

/// Counts hits per method and answers like a small tool server.
#[derive(Default)]
struct ScriptedServer {
    hits: Mutex<HashMap<String, usize>>,
    /// Every `tools/list` and `tools/call` reports an expired session.
    always_expired: bool,
    /// Only the first `tools/call` reports an expired session.
    expire_once: AtomicBool,
}

impl ScriptedServer {
    fn hits(&self, method: &str) -> usize {
        self.hits
            .lock()
            .map(|h| h.get(method).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

fn session_gone() -> JsonRpcError {
    JsonRpcError::new(-32001, "Session not found")
}

#[async_trait]
impl InProcessHandler for ScriptedServer {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        if let Ok(mut hits) = self.hits.lock() {
            *hits.entry(method.to_string()).or_default() += 1;
        }
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {"name": "scripted"},
                "capabilities": {"tools": {}}
            })),
            "tools/list" | "tools/call" if self.always_expired => Err(session_gone()),
            "tools/list" => Ok(json!({"tools": [{"name": "echo"}]})),
            "tools/call" => {
                if self.expire_once.swap(false, Ordering::SeqCst) {
                    return Err(session_gone());
                }
                let text = params.unwrap_or_default()["arguments"]["text"].clone();
                Ok(json!({"content": [{"type": "text", "text": text}]}))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

/// Builds linked transports to one shared server and counts the builds.
struct CountingFactory {
    server: Arc<ScriptedServer>,
    builds: AtomicUsize,
    delay: Duration,
    last_server_end: Mutex<Option<Arc<LinkedTransport>>>,
}

impl CountingFactory {
    fn new(server: ScriptedServer) -> Self {
        Self {
            server: Arc::new(server),
            builds: AtomicUsize::new(0),
            delay: Duration::ZERO,
            last_server_end: Mutex::new(None),
        }
    }

    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn server_end(&self) -> Arc<LinkedTransport> {
        self.last_server_end
            .lock()
            .unwrap()
            .clone()
            .expect("no transport built yet")
    }
}

#[async_trait]
impl TransportFactory for CountingFactory {
    async fn build(&self, _config: &ServerConfig) -> Result<Arc<dyn Transport>, TransportError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let (client, server) = LinkedTransport::pair();
        let server = Arc::new(server);
        serve_linked(Arc::clone(&server), Arc::clone(&self.server) as Arc<dyn InProcessHandler>);
        *self.last_server_end.lock().unwrap() = Some(server);
        Ok(Arc::new(client))
    }
}

async fn manager_with(
    factory: Arc<CountingFactory>,
    emitter: Arc<dyn AppEventEmitter>,
) -> Arc<McpManager> {
    let manager = McpManager::new(factory, emitter);
    manager
        .replace_config(ServerConfig::in_memory("scripted", "scripted"))
        .await;
    Arc::new(manager)
}

#[tokio::test]
async fn concurrent_starts_build_one_client() {
    let mut factory = CountingFactory::new(ScriptedServer::default());
    factory.delay = Duration::from_millis(50);
    let factory = Arc::new(factory);
    let manager = manager_with(Arc::clone(&factory), Arc::new(NoopEmitter)).await;

    let starts = (0..8).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start_server("scripted").await })
    });
    for handle in starts.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(factory.builds(), 1);
    assert_eq!(manager.running_servers().await, vec!["scripted".to_string()]);
}

#[tokio::test]
async fn start_is_noop_when_running() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let manager = manager_with(Arc::clone(&factory), Arc::new(NoopEmitter)).await;

    manager.start_server("scripted").await.unwrap();
    let first = manager.get_client("scripted").await.unwrap();
    manager.start_server("scripted").await.unwrap();
    let second = manager.get_client("scripted").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.builds(), 1);
}

#[tokio::test]
async fn unknown_and_not_running_servers() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let manager = manager_with(factory, Arc::new(NoopEmitter)).await;

    assert!(matches!(
        manager.start_server("ghost").await,
        Err(McpServiceError::UnknownServer(_))
    ));
    assert!(matches!(
        manager.list_tools("scripted").await,
        Err(McpServiceError::NotRunning(_))
    ));
    assert!(!manager.is_running("scripted").await);
}

#[tokio::test]
async fn disabled_server_is_refused() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let manager = manager_with(Arc::clone(&factory), Arc::new(NoopEmitter)).await;
    manager
        .replace_config(ServerConfig::in_memory("off", "scripted").with_disabled(true))
        .await;

    assert!(matches!(
        manager.start_server("off").await,
        Err(McpServiceError::Disabled(_))
    ));
    assert_eq!(factory.builds(), 0);
}

#[tokio::test]
async fn session_recovery_is_bounded() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer {
        always_expired: true,
        ..ScriptedServer::default()
    }));
    let emitter = ChannelEmitter::default();
    let mut events = emitter.subscribe();
    let manager = manager_with(Arc::clone(&factory), Arc::new(emitter)).await;
    manager.start_server("scripted").await.unwrap();
    let client = manager.get_client("scripted").await.unwrap();

    let result = manager.list_tools("scripted").await;

    assert!(matches!(result, Err(McpServiceError::Stopped { .. })));
    assert_eq!(factory.builds(), 2);
    assert_eq!(client.state().await, ConnectionState::Stopped);
    assert!(manager.get_client("scripted").await.is_none());

    let saw_error = std::iter::from_fn(|| events.try_recv().ok())
        .any(|e| matches!(e, AppEvent::McpServerError { .. }));
    assert!(saw_error);
}

#[tokio::test]
async fn tool_call_stops_after_second_session_error() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer {
        always_expired: true,
        ..ScriptedServer::default()
    }));
    let manager = manager_with(Arc::clone(&factory), Arc::new(NoopEmitter)).await;
    manager.start_server("scripted").await.unwrap();
    let client = manager.get_client("scripted").await.unwrap();

    let result = manager
        .call_tool("scripted", "echo", json!({"text": "hi"}))
        .await;

    match result {
        Err(McpServiceError::Stopped { name, .. }) => assert_eq!(name, "scripted"),
        other => panic!("expected a stopped error, got {other:?}"),
    }
    assert_eq!(factory.builds(), 2);
    assert_eq!(factory.server.hits("tools/call"), 2);
    assert_eq!(client.state().await, ConnectionState::Stopped);
    assert!(!manager.is_running("scripted").await);

    // Later calls see a server that is no longer running
    assert!(matches!(
        manager.call_tool("scripted", "echo", json!({})).await,
        Err(McpServiceError::NotRunning(_))
    ));
}

#[tokio::test]
async fn expired_session_recovers_once() {
    let server = ScriptedServer::default();
    server.expire_once.store(true, Ordering::SeqCst);
    let factory = Arc::new(CountingFactory::new(server));
    let manager = manager_with(Arc::clone(&factory), Arc::new(NoopEmitter)).await;
    manager.start_server("scripted").await.unwrap();

    let result = manager
        .call_tool("scripted", "echo", json!({"text": "again"}))
        .await
        .unwrap();

    assert_eq!(result.content[0]["text"], "again");
    assert_eq!(factory.builds(), 2);
    let client = manager.get_client("scripted").await.unwrap();
    assert!(client.is_connected().await);
    assert!(!client.has_restarted_once());
}

#[tokio::test]
async fn unsupported_prompts_hit_server_once() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let manager = manager_with(Arc::clone(&factory), Arc::new(NoopEmitter)).await;
    manager.start_server("scripted").await.unwrap();

    assert!(manager.list_prompts("scripted").await.unwrap().is_empty());
    assert!(manager.list_prompts("scripted").await.unwrap().is_empty());

    assert_eq!(factory.server.hits("prompts/list"), 1);
    assert!(manager.is_running("scripted").await);
}

#[tokio::test]
async fn tool_list_is_cached_until_changed() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let emitter = ChannelEmitter::default();
    let mut events = emitter.subscribe();
    let manager = manager_with(Arc::clone(&factory), Arc::new(emitter)).await;
    manager.start_server("scripted").await.unwrap();

    manager.list_tools("scripted").await.unwrap();
    manager.list_tools("scripted").await.unwrap();
    assert_eq!(factory.server.hits("tools/list"), 1);

    factory
        .server_end()
        .send(JsonRpcMessage::notification(
            "notifications/tools/list_changed",
            None,
        ))
        .await
        .unwrap();

    let expected = AppEvent::list_changed("scripted", ListKind::Tools);
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if events.recv().await.unwrap() == expected {
                break;
            }
        }
    })
    .await
    .expect("list change event");

    manager.list_tools("scripted").await.unwrap();
    assert_eq!(factory.server.hits("tools/list"), 2);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let emitter = ChannelEmitter::default();
    let mut events = emitter.subscribe();
    let manager = manager_with(factory, Arc::new(emitter)).await;
    manager.start_server("scripted").await.unwrap();

    manager.stop_server("scripted").await;
    manager.stop_server("scripted").await;
    manager.stop_server("never-started").await;

    assert!(!manager.is_running("scripted").await);
    let stopped = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| *e == AppEvent::status_changed("scripted", ConnectionState::Stopped))
        .count();
    assert_eq!(stopped, 1);
}

#[tokio::test]
async fn failed_start_deregisters_and_reports() {
    struct Broken;

    #[async_trait]
    impl TransportFactory for Broken {
        async fn build(&self, _config: &ServerConfig) -> Result<Arc<dyn Transport>, TransportError> {
            Err(TransportError::Spawn("command not found".to_string()))
        }
    }

    let emitter = ChannelEmitter::default();
    let mut events = emitter.subscribe();
    let manager = McpManager::new(Arc::new(Broken), Arc::new(emitter));
    manager
        .replace_config(ServerConfig::in_memory("broken", "broken"))
        .await;

    let err = manager.start_server("broken").await.unwrap_err();

    assert!(matches!(err, McpServiceError::StartFailed { .. }));
    assert!(err.to_string().contains("command not found"));
    assert!(manager.get_client("broken").await.is_none());
    let kinds: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.event_name())
        .collect();
    assert!(kinds.contains(&"notification"));
    assert!(kinds.contains(&"mcp:error"));
}

#[tokio::test]
async fn auto_approve_follows_config() {
    use toolbridge_core::AutoApprove;

    let factory = Arc::new(CountingFactory::new(ScriptedServer::default()));
    let manager = manager_with(factory, Arc::new(NoopEmitter)).await;
    manager
        .replace_config(
            ServerConfig::in_memory("picky", "scripted")
                .with_auto_approve(AutoApprove::Tools(vec!["read".to_string()])),
        )
        .await;

    assert!(manager.is_auto_approved("picky", "read").await);
    assert!(!manager.is_auto_approved("picky", "write").await);
    assert!(!manager.is_auto_approved("scripted", "read").await);
}
