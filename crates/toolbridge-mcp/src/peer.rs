//! Request/response correlation over a transport.

use crate::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcResponse, RequestId,
};
use crate::transport::{Transport, TransportError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Rpc(JsonRpcError),

    #[error("Connection closed before a response arrived")]
    Closed,

    #[error("Malformed response: {0}")]
    Malformed(String),
}

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Result<Value, JsonRpcError>>>>>;

/// One side of a JSON-RPC conversation.
///
/// Any number of requests may be in flight at once; a background reader
/// routes responses to their callers by id.
pub struct RpcPeer {
    transport: Arc<dyn Transport>,
    next_id: AtomicI64,
    pending: Pending,
    reader: JoinHandle<()>,
}

impl RpcPeer {
    /// Start reading from `transport`. Server notifications go to `notifications`.
    pub fn new(
        transport: Arc<dyn Transport>,
        notifications: Option<mpsc::UnboundedSender<JsonRpcNotification>>,
    ) -> Self {
        let pending: Pending = Arc::default();
        let reader = tokio::spawn(read_loop(
            Arc::clone(&transport),
            Arc::clone(&pending),
            notifications,
        ));
        Self {
            transport,
            next_id: AtomicI64::new(1),
            pending,
            reader,
        }
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, PeerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(RequestId::Number(id), tx);

        tracing::trace!(id, method, "Sending request");
        if let Err(e) = self
            .transport
            .send(JsonRpcMessage::request(id, method, params))
            .await
        {
            self.pending.lock().await.remove(&RequestId::Number(id));
            return Err(e.into());
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(PeerError::Rpc(error)),
            Err(_) => Err(PeerError::Closed),
        }
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), PeerError> {
        self.transport
            .send(JsonRpcMessage::notification(method, params))
            .await
            .map_err(Into::into)
    }

    /// Close the transport and fail every outstanding request.
    pub async fn close(&self) {
        self.transport.close().await;
        self.reader.abort();
        self.pending.lock().await.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }
}

impl Drop for RpcPeer {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    transport: Arc<dyn Transport>,
    pending: Pending,
    notifications: Option<mpsc::UnboundedSender<JsonRpcNotification>>,
) {
    while let Some(message) = transport.receive().await {
        match message {
            JsonRpcMessage::Response(response) => route_response(&pending, response).await,
            JsonRpcMessage::Notification(notification) => {
                tracing::debug!(method = %notification.method, "Server notification");
                if let Some(tx) = &notifications {
                    let _ = tx.send(notification);
                }
            }
            JsonRpcMessage::Request(request) => {
                // Only liveness checks are answered; this client offers no capabilities
                let reply = if request.method == "ping" {
                    JsonRpcMessage::result(request.id, json!({}))
                } else {
                    JsonRpcMessage::error(request.id, JsonRpcError::method_not_found(&request.method))
                };
                if let Err(e) = transport.send(reply).await {
                    tracing::debug!(error = %e, "Failed to answer server request");
                }
            }
        }
    }

    // Dropping the senders wakes every waiter with `Closed`
    pending.lock().await.clear();
}

async fn route_response(pending: &Pending, response: JsonRpcResponse) {
    let Some(id) = response.id else {
        tracing::debug!(error = ?response.error, "Response without id");
        return;
    };
    let Some(tx) = pending.lock().await.remove(&id) else {
        tracing::debug!(%id, "Response for unknown request");
        return;
    };
    let outcome = match (response.result, response.error) {
        (_, Some(error)) => Err(error),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(Value::Null),
    };
    let _ = tx.send(outcome);
}
