//! Persistent event-stream transport.
//!
//! The server announces its POST endpoint in an `endpoint` event; every
//! JSON-RPC message from the server arrives as a `message` event.

use super::sse_parser::SseParser;
use super::{Transport, TransportError, http_headers};
use crate::jsonrpc::JsonRpcMessage;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::collections::BTreeMap;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

pub struct SseTransport {
    http: reqwest::Client,
    headers: HeaderMap,
    endpoint: Url,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the stream and wait for the endpoint announcement.
    pub async fn connect(
        url: &str,
        headers: &BTreeMap<String, String>,
        bearer_token: Option<&str>,
    ) -> Result<Self, TransportError> {
        let stream_url =
            Url::parse(url).map_err(|e| TransportError::Config(format!("invalid url '{url}': {e}")))?;
        let headers = http_headers(headers, bearer_token)?;
        let http = reqwest::Client::new();

        let response = http
            .get(stream_url.clone())
            .headers(headers.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::http(status, "connecting to", url, &body));
        }

        let (tx, rx) = mpsc::channel(64);
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let base = stream_url.clone();
        let reader = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(url = %base, error = %e, "Event stream failed");
                        break;
                    }
                };
                for event in parser.push(&chunk) {
                    match event.event.as_str() {
                        "endpoint" => match base.join(event.data.trim()) {
                            Ok(endpoint) => {
                                if let Some(sender) = endpoint_tx.take() {
                                    let _ = sender.send(endpoint);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(data = %event.data, error = %e, "Invalid endpoint event");
                            }
                        },
                        "message" => match JsonRpcMessage::parse(&event.data) {
                            Some(message) => {
                                if tx.send(message).await.is_err() {
                                    return;
                                }
                            }
                            None => tracing::debug!(data = %event.data, "Skipping non-JSON-RPC event"),
                        },
                        other => tracing::debug!(event = other, "Ignoring event"),
                    }
                }
            }
            tracing::debug!(url = %base, "Event stream closed");
        });

        let endpoint = match endpoint_rx.await {
            Ok(endpoint) => endpoint,
            Err(_) => {
                reader.abort();
                return Err(TransportError::Closed);
            }
        };
        tracing::debug!(endpoint = %endpoint, "Event stream endpoint announced");

        Ok(Self {
            http,
            headers,
            endpoint,
            inbound: Mutex::new(rx),
            reader,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.reader.is_finished() {
            return Err(TransportError::Closed);
        }
        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::http(
                status,
                "posting to",
                self.endpoint.as_str(),
                &body,
            ));
        }
        Ok(())
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        self.reader.abort();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
