//! Constructors for server lifecycle events.

use serde::{Deserialize, Serialize};

use super::AppEvent;
use crate::domain::{ConnectionState, ListKind};
use crate::ports::McpErrorInfo;

/// How loudly a notification should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl AppEvent {
    pub fn status_changed(server_name: impl Into<String>, state: ConnectionState) -> Self {
        Self::ServerStatusChanged {
            server_name: server_name.into(),
            state,
        }
    }

    /// A server announced that one of its catalogs changed.
    pub fn list_changed(server_name: impl Into<String>, kind: ListKind) -> Self {
        Self::ListChanged {
            server_name: server_name.into(),
            kind,
        }
    }

    pub const fn mcp_server_error(error: McpErrorInfo) -> Self {
        Self::McpServerError { error }
    }

    /// Notification ids are `notification-<unix millis>`.
    pub fn notification(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self::Notification {
            id: format!("notification-{}", chrono::Utc::now().timestamp_millis()),
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}
