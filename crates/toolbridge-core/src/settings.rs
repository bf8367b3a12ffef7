//! Settings domain types and validation.
//!
//! Pure domain types; the host decides where they are persisted.

use serde::{Deserialize, Serialize};

/// Default per-probe timeout for registry mirror probing.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Default timeout for the network reachability check.
pub const DEFAULT_NETWORK_CHECK_TIMEOUT_MS: u64 = 3_000;

/// Default handshake timeout applied when a server sets none.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 300;

/// Application settings structure.
///
/// All fields are optional to support partial files and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Prefix prepended to clone URLs (`<proxy>/<url>`).
    pub git_proxy: Option<String>,

    /// Fixed package registry; disables mirror probing when set.
    pub registry: Option<String>,

    /// Mirror list replacing the built-in one.
    pub registry_mirrors: Option<Vec<String>>,

    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: Option<u64>,

    /// Network check timeout in milliseconds.
    pub network_check_timeout_ms: Option<u64>,

    /// Whether starting a server pre-installs its package in the background.
    pub preinstall_packages: Option<bool>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            git_proxy: None,
            registry: None,
            registry_mirrors: None,
            probe_timeout_ms: Some(DEFAULT_PROBE_TIMEOUT_MS),
            network_check_timeout_ms: Some(DEFAULT_NETWORK_CHECK_TIMEOUT_MS),
            preinstall_packages: Some(true),
        }
    }

    #[must_use]
    pub const fn effective_probe_timeout_ms(&self) -> u64 {
        match self.probe_timeout_ms {
            Some(ms) => ms,
            None => DEFAULT_PROBE_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub const fn effective_network_check_timeout_ms(&self) -> u64 {
        match self.network_check_timeout_ms {
            Some(ms) => ms,
            None => DEFAULT_NETWORK_CHECK_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub const fn effective_preinstall(&self) -> bool {
        match self.preinstall_packages {
            Some(enabled) => enabled,
            None => true,
        }
    }

    /// Git proxy with surrounding whitespace and trailing slashes removed.
    pub fn effective_git_proxy(&self) -> Option<&str> {
        self.git_proxy
            .as_deref()
            .map(|p| p.trim().trim_end_matches('/'))
            .filter(|p| !p.is_empty())
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Timeout must be between 100 and 60000 ms, got {0}")]
    InvalidTimeout(u64),

    #[error("Registry URL must be http(s): {0}")]
    InvalidRegistry(String),

    #[error("Mirror list cannot be empty")]
    EmptyMirrors,
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    for ms in [settings.probe_timeout_ms, settings.network_check_timeout_ms]
        .into_iter()
        .flatten()
    {
        if !(100..=60_000).contains(&ms) {
            return Err(SettingsError::InvalidTimeout(ms));
        }
    }

    let is_http = |url: &str| url.starts_with("http://") || url.starts_with("https://");

    if let Some(ref registry) = settings.registry {
        if !is_http(registry) {
            return Err(SettingsError::InvalidRegistry(registry.clone()));
        }
    }

    if let Some(ref mirrors) = settings.registry_mirrors {
        if mirrors.is_empty() {
            return Err(SettingsError::EmptyMirrors);
        }
        if let Some(bad) = mirrors.iter().find(|m| !is_http(m)) {
            return Err(SettingsError::InvalidRegistry(bad.clone()));
        }
    }

    Ok(())
}
