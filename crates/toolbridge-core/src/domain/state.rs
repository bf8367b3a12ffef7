//! Connection lifecycle state of a protocol client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single tool server connection.
///
/// `Disconnected -> Connecting -> Connected -> Recovering -> (Connected | Stopped)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Recovering,
    Stopped,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Recovering => "recovering",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the connection can serve requests without reconnecting.
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three artifact surfaces of a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Tools,
    Prompts,
    Resources,
}

impl ListKind {
    /// Map a `notifications/<kind>/list_changed` method to its surface.
    pub fn from_notification(method: &str) -> Option<Self> {
        match method {
            "notifications/tools/list_changed" => Some(Self::Tools),
            "notifications/prompts/list_changed" => Some(Self::Prompts),
            "notifications/resources/list_changed" => Some(Self::Resources),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Prompts => "prompts",
            Self::Resources => "resources",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Recovering).unwrap();
        assert_eq!(json, "\"recovering\"");
    }

    #[test]
    fn test_list_kind_from_notification() {
        assert_eq!(
            ListKind::from_notification("notifications/prompts/list_changed"),
            Some(ListKind::Prompts)
        );
        assert_eq!(ListKind::from_notification("notifications/progress"), None);
    }
}
