//! Package cache and repository download events.

use serde::{Deserialize, Serialize};

use super::AppEvent;

/// Progress of a package cache installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallEvent {
    Started {
        package: String,
    },
    /// One line of installer output.
    Progress {
        package: String,
        line: String,
    },
    Completed {
        package: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Failed {
        package: String,
        error: String,
    },
}

impl InstallEvent {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "install:started",
            Self::Progress { .. } => "install:progress",
            Self::Completed { .. } => "install:completed",
            Self::Failed { .. } => "install:failed",
        }
    }

    pub fn package(&self) -> &str {
        match self {
            Self::Started { package }
            | Self::Progress { package, .. }
            | Self::Completed { package, .. }
            | Self::Failed { package, .. } => package,
        }
    }
}

/// Progress of a remote repository download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryEvent {
    Started {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Progress {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        message: String,
    },
    Completed {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        workspace: String,
    },
    Failed {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        error: String,
    },
}

impl RepositoryEvent {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "repository:started",
            Self::Progress { .. } => "repository:progress",
            Self::Completed { .. } => "repository:completed",
            Self::Failed { .. } => "repository:failed",
        }
    }
}

impl AppEvent {
    pub const fn install(event: InstallEvent) -> Self {
        Self::Install { event }
    }

    pub const fn repository(event: RepositoryEvent) -> Self {
        Self::Repository { event }
    }
}
