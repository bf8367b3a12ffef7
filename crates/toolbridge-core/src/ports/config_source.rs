//! Server registry source trait and implementations.
//!
//! The registry is read-only from the subsystem's point of view: the host owns
//! persistence, the manager only consumes snapshots.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::ServerConfig;

/// Errors from loading the server registry.
#[derive(Debug, Error)]
pub enum ConfigSourceError {
    /// Reading the registry file failed.
    #[error("Failed to read server registry {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    /// The registry file is not valid JSON for this schema.
    #[error("Failed to parse server registry {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A server entry failed validation.
    #[error("Invalid server '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Snapshot of all configured servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRegistry {
    pub servers: Vec<ServerConfig>,
    /// Servers started by `initialize()`.
    pub default_servers: Vec<String>,
    /// Global switch; when false nothing is started.
    pub enabled: bool,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_servers: Vec::new(),
            enabled: true,
        }
    }
}

impl ServerRegistry {
    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

/// Source of server configurations.
#[async_trait]
pub trait ServerConfigSource: Send + Sync {
    /// Load the current registry snapshot.
    async fn load(&self) -> Result<ServerRegistry, ConfigSourceError>;
}

/// In-memory registry, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    registry: ServerRegistry,
}

impl StaticConfigSource {
    pub const fn new(registry: ServerRegistry) -> Self {
        Self { registry }
    }

    /// Registry with the given servers, all enabled, no defaults.
    pub fn from_servers(servers: Vec<ServerConfig>) -> Self {
        Self::new(ServerRegistry {
            servers,
            ..ServerRegistry::default()
        })
    }
}

#[async_trait]
impl ServerConfigSource for StaticConfigSource {
    async fn load(&self) -> Result<ServerRegistry, ConfigSourceError> {
        Ok(self.registry.clone())
    }
}

/// On-disk shape: `{"mcpServers": {...}, "defaultServers": [...], "enabled": true}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    #[serde(default)]
    mcp_servers: BTreeMap<String, ServerConfig>,
    #[serde(default)]
    default_servers: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// Registry stored as a JSON file.
///
/// A missing file is an empty registry, not an error.
#[derive(Debug, Clone)]
pub struct JsonFileConfigSource {
    path: PathBuf,
}

impl JsonFileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse registry JSON text.
    pub fn parse(path: &Path, text: &str) -> Result<ServerRegistry, ConfigSourceError> {
        let file: RegistryFile =
            serde_json::from_str(text).map_err(|e| ConfigSourceError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let servers = file
            .mcp_servers
            .into_iter()
            .map(|(name, mut config)| {
                config.name = name;
                config
                    .validate()
                    .map_err(|reason| ConfigSourceError::Invalid {
                        name: config.name.clone(),
                        reason,
                    })?;
                Ok(config)
            })
            .collect::<Result<Vec<_>, ConfigSourceError>>()?;

        Ok(ServerRegistry {
            servers,
            default_servers: file.default_servers,
            enabled: file.enabled,
        })
    }

    /// Write a registry back to disk, creating parent directories.
    pub async fn save(&self, registry: &ServerRegistry) -> Result<(), ConfigSourceError> {
        let io_err = |e: std::io::Error| ConfigSourceError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        let file = RegistryFile {
            mcp_servers: registry
                .servers
                .iter()
                .map(|s| (s.name.clone(), s.clone()))
                .collect(),
            default_servers: registry.default_servers.clone(),
            enabled: registry.enabled,
        };
        let text = serde_json::to_string_pretty(&file).map_err(|e| ConfigSourceError::Parse {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, text).await.map_err(io_err)
    }
}

#[async_trait]
impl ServerConfigSource for JsonFileConfigSource {
    async fn load(&self) -> Result<ServerRegistry, ConfigSourceError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Server registry not found, using empty registry");
                return Ok(ServerRegistry::default());
            }
            Err(e) => {
                return Err(ConfigSourceError::Io {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        Self::parse(&self.path, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransportKind;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "mcpServers": {
            "filesystem": {"command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem"]},
            "remote": {"type": "sse", "url": "https://example.com/sse", "disabled": true}
        },
        "defaultServers": ["filesystem"]
    }"#;

    #[test]
    fn test_parse_fills_names_from_keys() {
        let registry = JsonFileConfigSource::parse(Path::new("mcp.json"), SAMPLE).unwrap();

        assert!(registry.enabled);
        assert_eq!(registry.default_servers, vec!["filesystem"]);
        let remote = registry.get("remote").unwrap();
        assert_eq!(remote.transport, TransportKind::Sse);
        assert!(remote.disabled);
        assert_eq!(registry.get("filesystem").unwrap().args.len(), 2);
    }

    #[test]
    fn test_parse_rejects_invalid_entry() {
        let text = r#"{"mcpServers": {"broken": {"type": "sse"}}}"#;
        let err = JsonFileConfigSource::parse(Path::new("mcp.json"), text).unwrap_err();
        assert!(matches!(err, ConfigSourceError::Invalid { ref name, .. } if name == "broken"));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileConfigSource::new(dir.path().join("nope.json"));
        let registry = source.load().await.unwrap();
        assert!(registry.servers.is_empty());
        assert!(registry.enabled);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileConfigSource::new(dir.path().join("nested").join("mcp.json"));
        let registry = ServerRegistry {
            servers: vec![ServerConfig::stdio("git", "uvx", vec!["mcp-server-git".into()])],
            default_servers: vec!["git".into()],
            enabled: false,
        };

        source.save(&registry).await.unwrap();
        let loaded = source.load().await.unwrap();

        assert_eq!(loaded, registry);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticConfigSource::from_servers(vec![ServerConfig::sse("a", "http://x")]);
        assert_eq!(source.load().await.unwrap().servers.len(), 1);
    }
}
