//! Message transports for tool servers.
//!
//! Every transport moves whole [`JsonRpcMessage`]s; framing is the
//! transport's business. The [`TransportFactory`] picks one from a
//! [`ServerConfig`](toolbridge_core::ServerConfig).

mod factory;
mod memory;
mod sse;
mod sse_parser;
mod stdio;
mod streamable;

pub use factory::{DefaultTransportFactory, TransportFactory};
#[cfg(test)]
pub use factory::MockTransportFactory;
pub use memory::{InProcessHandler, InProcessRegistry, LinkedTransport, serve_linked};
pub use sse::SseTransport;
pub use sse_parser::{SseEvent, SseParser};
pub use stdio::{StdioLaunch, StdioTransport};
pub use streamable::StreamableHttpTransport;

use crate::jsonrpc::JsonRpcMessage;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-success HTTP status; the message carries status, endpoint and body.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Transport closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

impl TransportError {
    pub(crate) fn http(status: reqwest::StatusCode, action: &str, url: &str, body: &str) -> Self {
        let reason = status.canonical_reason().unwrap_or("");
        Self::Http {
            status: status.as_u16(),
            message: format!(
                "HTTP {} {reason} while {action} endpoint {url}: {}",
                status.as_u16(),
                body.trim()
            ),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Bidirectional message channel to one server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError>;

    /// Next inbound message; `None` once the transport is closed.
    async fn receive(&self) -> Option<JsonRpcMessage>;

    async fn close(&self);
}

/// Header map for HTTP transports, with the bearer token folded in.
pub(crate) fn http_headers(
    headers: &BTreeMap<String, String>,
    bearer_token: Option<&str>,
) -> Result<reqwest::header::HeaderMap, TransportError> {
    use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| TransportError::Config(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Config(format!("invalid value for header '{key}': {e}")))?;
        map.insert(name, value);
    }
    if let Some(token) = bearer_token.filter(|t| !t.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::Config(format!("invalid bearer token: {e}")))?;
        map.insert(AUTHORIZATION, value);
    }
    Ok(map)
}
