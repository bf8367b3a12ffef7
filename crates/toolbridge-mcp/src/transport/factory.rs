//! Builds the right transport for a server config.

use super::memory::InProcessRegistry;
use super::sse::SseTransport;
use super::stdio::{StdioLaunch, StdioTransport};
use super::streamable::StreamableHttpTransport;
use super::{Transport, TransportError};
use crate::path::{build_child_path, validate_working_dir};
use crate::resolver::CommandResolver;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolbridge_core::{CredentialSource, NoCredentials, ServerConfig, TransportKind};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn build(&self, config: &ServerConfig) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Factory for all four transport kinds.
pub struct DefaultTransportFactory {
    resolver: CommandResolver,
    credentials: Arc<dyn CredentialSource>,
    in_process: Arc<InProcessRegistry>,
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        Self::new(
            CommandResolver::system(),
            Arc::new(NoCredentials),
            Arc::new(InProcessRegistry::new()),
        )
    }
}

impl DefaultTransportFactory {
    pub fn new(
        resolver: CommandResolver,
        credentials: Arc<dyn CredentialSource>,
        in_process: Arc<InProcessRegistry>,
    ) -> Self {
        Self {
            resolver,
            credentials,
            in_process,
        }
    }

    pub fn in_process(&self) -> &Arc<InProcessRegistry> {
        &self.in_process
    }

    /// Resolve the command line and environment for a stdio server.
    pub fn stdio_launch(&self, config: &ServerConfig) -> Result<StdioLaunch, TransportError> {
        let command = config
            .command
            .as_deref()
            .ok_or_else(|| TransportError::Config(format!("'{}' has no command", config.name)))?;

        let resolved = self.resolver.resolve(command, &config.args);

        let cwd = match config.working_dir.as_deref() {
            Some(dir) => {
                let dir = self.resolver.expand(dir);
                validate_working_dir(&dir).map_err(TransportError::Spawn)?;
                Some(dir.into())
            }
            None => None,
        };

        let mut env: BTreeMap<String, String> = self.credentials.credential_env();
        for (key, value) in &config.env {
            env.insert(key.clone(), self.resolver.expand(value));
        }
        let path_extra = config.path_extra.as_deref().map(|p| self.resolver.expand(p));
        let path = build_child_path(&self.resolver, &resolved, path_extra.as_deref());

        Ok(StdioLaunch {
            server_name: config.name.clone(),
            program: resolved.command,
            args: resolved.args,
            env,
            path: Some(path),
            cwd,
        })
    }

    fn expanded_headers(&self, config: &ServerConfig) -> BTreeMap<String, String> {
        config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), self.resolver.expand(v)))
            .collect()
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn build(&self, config: &ServerConfig) -> Result<Arc<dyn Transport>, TransportError> {
        tracing::debug!(server_name = %config.name, transport = %config.transport, "Building transport");

        match config.transport {
            TransportKind::Stdio => {
                let launch = self.stdio_launch(config)?;
                Ok(Arc::new(StdioTransport::spawn(&launch)?))
            }
            TransportKind::InMemory => {
                let command = config.command.as_deref().ok_or_else(|| {
                    TransportError::Config(format!("'{}' has no command", config.name))
                })?;
                Ok(Arc::new(self.in_process.connect(command)?))
            }
            TransportKind::Sse => {
                let url = config.url.as_deref().ok_or_else(|| {
                    TransportError::Config(format!("'{}' has no url", config.name))
                })?;
                let headers = self.expanded_headers(config);
                let transport =
                    SseTransport::connect(url, &headers, config.bearer_token.as_deref()).await?;
                Ok(Arc::new(transport))
            }
            TransportKind::StreamableHttp => {
                let url = config.url.as_deref().ok_or_else(|| {
                    TransportError::Config(format!("'{}' has no url", config.name))
                })?;
                let headers = self.expanded_headers(config);
                Ok(Arc::new(StreamableHttpTransport::new(
                    url,
                    &headers,
                    config.bearer_token.as_deref(),
                )?))
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::resolver::{MockEnv, MockFs};

    struct FixedCredentials;

    impl CredentialSource for FixedCredentials {
        fn credential_env(&self) -> BTreeMap<String, String> {
            BTreeMap::from([("OPENAI_API_KEY".to_string(), "sk-host".to_string())])
        }
    }

    fn factory() -> DefaultTransportFactory {
        let env = MockEnv::new()
            .with_var("HOME", "/home/dev")
            .with_var("PATH", "/usr/bin")
            .with_var("TOKEN", "secret");
        let fs = MockFs::new().with_executable("/usr/bin/node");
        DefaultTransportFactory::new(
            CommandResolver::new(Arc::new(env), Arc::new(fs)),
            Arc::new(FixedCredentials),
            Arc::new(InProcessRegistry::new()),
        )
    }

    #[test]
    fn test_stdio_launch_layers_env() {
        let config = ServerConfig::stdio("files", "node", vec!["server.js".to_string()])
            .with_env("API_TOKEN", "${TOKEN}")
            .with_env("OPENAI_API_KEY", "sk-config");

        let launch = factory().stdio_launch(&config).unwrap();

        assert_eq!(launch.program, "/usr/bin/node");
        assert_eq!(launch.args, vec!["server.js".to_string()]);
        assert_eq!(launch.env.get("API_TOKEN").unwrap(), "secret");
        // Config env wins over the credential overlay
        assert_eq!(launch.env.get("OPENAI_API_KEY").unwrap(), "sk-config");
        let path = launch.path.unwrap();
        assert_eq!(std::env::split_paths(&path).next().unwrap(), std::path::PathBuf::from("/usr/bin"));
    }

    #[test]
    fn test_stdio_launch_rejects_missing_working_dir() {
        let config = ServerConfig::stdio("files", "node", vec![])
            .with_working_dir("/definitely/not/a/dir");
        assert!(matches!(
            factory().stdio_launch(&config),
            Err(TransportError::Spawn(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_in_process_server() {
        let config = ServerConfig::in_memory("mem", "not-registered");
        let result = factory().build(&config).await;
        assert!(matches!(result, Err(TransportError::Config(_))));
    }
}
