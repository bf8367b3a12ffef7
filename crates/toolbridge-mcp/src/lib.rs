//! Tool server management for toolbridge.
//!
//! Starts and stops external tool servers speaking the Model Context
//! Protocol, routes requests to them over stdio, SSE, streamable HTTP or an
//! in-process link, and recovers once from expired sessions.
//!
//! - `resolver` - locating executables and normalizing launch commands
//! - `transport` - the four message transports and their factory
//! - `peer` - JSON-RPC request/response correlation over a transport
//! - `client` - per-server protocol client with list caches and recovery
//! - `manager` - configuration and client registries
//! - `service` - the surface collaborators call

#![deny(unsafe_code)]

pub mod client;
pub mod jsonrpc;
pub mod manager;
pub(crate) mod path;
pub mod peer;
pub mod resolver;
pub mod service;
pub mod transport;

pub use client::{ClientError, ErrorClass, ListCache, PhraseClassifier, ProtocolClient, SessionErrorClassifier};
pub use manager::McpManager;
pub use resolver::{CommandResolver, ResolvedCommand};
pub use service::{McpService, ReloadSummary};
pub use transport::{
    DefaultTransportFactory, InProcessHandler, InProcessRegistry, Transport, TransportError,
    TransportFactory,
};
