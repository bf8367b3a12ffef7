//! Request/response HTTP transport.
//!
//! Every outbound message is a POST. Replies come back either as a JSON body
//! or as an event-stream body; both land in the inbound queue.

use super::sse_parser::SseParser;
use super::{Transport, TransportError, http_headers};
use crate::jsonrpc::JsonRpcMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use url::Url;

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on the session-termination request sent by `close`.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StreamableHttpTransport {
    http: reqwest::Client,
    url: Url,
    headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    inbound_tx: mpsc::Sender<JsonRpcMessage>,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    closed: watch::Sender<bool>,
    close_timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new(
        url: &str,
        headers: &BTreeMap<String, String>,
        bearer_token: Option<&str>,
    ) -> Result<Self, TransportError> {
        let url =
            Url::parse(url).map_err(|e| TransportError::Config(format!("invalid url '{url}': {e}")))?;
        let (inbound_tx, inbound) = mpsc::channel(64);
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            headers: http_headers(headers, bearer_token)?,
            session_id: RwLock::new(None),
            inbound_tx,
            inbound: Mutex::new(inbound),
            closed: watch::channel(false).0,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn enqueue(&self, messages: Vec<JsonRpcMessage>) {
        for message in messages {
            if self.inbound_tx.send(message).await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut request = self
            .http
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(
                ACCEPT,
                HeaderValue::from_static("application/json, text/event-stream"),
            )
            .json(&message);
        if let Some(session) = self.session_id().await {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut current = self.session_id.write().await;
            if current.as_deref() != Some(session) {
                tracing::debug!(session_id = session, "Captured session id");
                *current = Some(session.to_string());
            }
        }

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::http(
                status,
                "posting to",
                self.url.as_str(),
                &body,
            ));
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if is_stream {
            // Long-lived streams must not block the sender
            let tx = self.inbound_tx.clone();
            tokio::spawn(async move {
                let mut parser = SseParser::new();
                let mut stream = response.bytes_stream();
                while let Some(Ok(chunk)) = stream.next().await {
                    for event in parser.push(&chunk) {
                        if event.event != "message" {
                            continue;
                        }
                        if let Some(message) = JsonRpcMessage::parse(&event.data) {
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                if let Some(event) = parser.finish() {
                    if let Some(message) = JsonRpcMessage::parse(&event.data) {
                        let _ = tx.send(message).await;
                    }
                }
            });
            return Ok(());
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        let value: serde_json::Value = serde_json::from_str(&body)?;
        self.enqueue(JsonRpcMessage::from_value_batch(value)).await;
        Ok(())
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
        if self.closed.send_replace(true) {
            return;
        }
        // Best effort session termination
        let Some(session) = self.session_id.write().await.take() else {
            return;
        };
        let request = self
            .http
            .delete(self.url.clone())
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send();
        match tokio::time::timeout(self.close_timeout, request).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!(url = %self.url, error = %e, "Session termination failed");
            }
            Err(_) => {
                tracing::debug!(
                    url = %self.url,
                    timeout_ms = self.close_timeout.as_millis(),
                    "Session termination timed out"
                );
            }
        }
    }
}
