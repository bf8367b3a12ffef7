//! In-process servers connected through a linked channel pair.

use super::{Transport, TransportError};
use crate::jsonrpc::{JsonRpcError, JsonRpcMessage};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// One end of a linked pair. Whatever one end sends, the other receives.
pub struct LinkedTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<JsonRpcMessage>>>,
    inbound: Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
    closed: watch::Sender<bool>,
}

impl LinkedTransport {
    /// Two wired endpoints: `(client, server)`.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(
        outbound: mpsc::UnboundedSender<JsonRpcMessage>,
        inbound: mpsc::UnboundedReceiver<JsonRpcMessage>,
    ) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            inbound: Mutex::new(inbound),
            closed: watch::channel(false).0,
        }
    }
}

#[async_trait]
impl Transport for LinkedTransport {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        let guard = self.outbound.lock().await;
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message).map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return None;
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            message = inbound.recv() => message,
            _ = closed.wait_for(|c| *c) => None,
        }
    }

    async fn close(&self) {
        self.outbound.lock().await.take();
        self.closed.send_replace(true);
    }
}

/// Answers requests for an in-process server.
#[async_trait]
pub trait InProcessHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError>;
}

/// Serve requests arriving on `endpoint` until the peer goes away.
///
/// Requests are answered concurrently; notifications are ignored.
pub fn serve_linked(
    endpoint: Arc<LinkedTransport>,
    handler: Arc<dyn InProcessHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = endpoint.receive().await {
            let JsonRpcMessage::Request(request) = message else {
                continue;
            };
            let endpoint = Arc::clone(&endpoint);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let reply = match handler.handle(&request.method, request.params).await {
                    Ok(result) => JsonRpcMessage::result(request.id, result),
                    Err(error) => JsonRpcMessage::error(request.id, error),
                };
                if endpoint.send(reply).await.is_err() {
                    tracing::debug!(method = %request.method, "Client went away before reply");
                }
            });
        }
    })
}

/// Lookup table of in-process servers keyed by command name.
#[derive(Default)]
pub struct InProcessRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn InProcessHandler>>>,
}

impl InProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, command: impl Into<String>, handler: Arc<dyn InProcessHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(command.into(), handler);
        }
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers
            .read()
            .is_ok_and(|handlers| handlers.contains_key(command))
    }

    /// Create a linked pair and start serving its server end.
    pub fn connect(&self, command: &str) -> Result<LinkedTransport, TransportError> {
        let handler = self
            .handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(command).cloned())
            .ok_or_else(|| {
                TransportError::Config(format!("No in-process server registered as '{command}'"))
            })?;

        let (client, server) = LinkedTransport::pair();
        serve_linked(Arc::new(server), handler);
        Ok(client)
    }
}
