//! Canonical event union for everything the subsystem reports to the host.
//!
//! # Structure
//!
//! - `mcp` - connection lifecycle, list changes and user notifications
//! - `install` - package cache installs and repository downloads
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "server_status_changed", "serverName": "filesystem", "state": "connected" }
//! ```

mod install;
mod mcp;

use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionState, ListKind};
use crate::ports::McpErrorInfo;

pub use install::{InstallEvent, RepositoryEvent};
pub use mcp::Severity;

/// Canonical event type emitted through `AppEventEmitter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Connection Events ==========
    /// A protocol client moved to a new lifecycle state.
    ServerStatusChanged {
        #[serde(rename = "serverName")]
        server_name: String,
        state: ConnectionState,
    },

    /// A server reported that one of its artifact lists changed.
    ListChanged {
        #[serde(rename = "serverName")]
        server_name: String,
        kind: ListKind,
    },

    /// A server operation failed in a way the user should see.
    McpServerError {
        /// User-safe error information.
        error: McpErrorInfo,
    },

    /// User-facing notification (toast).
    Notification {
        id: String,
        title: String,
        message: String,
        severity: Severity,
    },

    // ========== Install Events ==========
    /// Package cache installation progress.
    #[serde(rename = "install")]
    Install {
        event: InstallEvent,
    },

    /// Remote repository download progress.
    #[serde(rename = "repository")]
    Repository {
        event: RepositoryEvent,
    },
}

impl AppEvent {
    /// Get the event name for wire protocols.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ServerStatusChanged { .. } => "mcp:status",
            Self::ListChanged { .. } => "mcp:list_changed",
            Self::McpServerError { .. } => "mcp:error",
            Self::Notification { .. } => "notification",
            Self::Install { event } => event.event_name(),
            Self::Repository { event } => event.event_name(),
        }
    }
}
