//! `McpService` configuration loading and cache passthroughs.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use toolbridge_core::{
    ConfigSourceError, McpServiceError, NoCredentials, NoopEmitter, RepositoryOrigin,
    ServerConfig, ServerConfigSource, ServerRegistry,
};
use toolbridge_install::{
    CommandOutput, CommandRunner, CommandSpec, HttpNetworkCheck, LineSink, PackageCache,
    RegistryProber, RepositoryFetcher, RunnerError, SystemRunner,
};
use toolbridge_mcp::jsonrpc::JsonRpcError;
use toolbridge_mcp::{
    CommandResolver, DefaultTransportFactory, InProcessHandler, InProcessRegistry, McpManager,
    McpService,
};

struct Notes;

#[async_trait]
impl InProcessHandler for Notes {
    async fn handle(&self, method: &str, _params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(json!({"serverInfo": {"name": "notes"}})),
            "tools/list" => Ok(json!({"tools": [{"name": "add_note"}]})),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

/// Registry snapshot the test can swap between reloads.
struct SwappableSource(Mutex<ServerRegistry>);

impl SwappableSource {
    fn set(&self, registry: ServerRegistry) {
        *self.0.lock().unwrap() = registry;
    }
}

#[async_trait]
impl ServerConfigSource for SwappableSource {
    async fn load(&self) -> Result<ServerRegistry, ConfigSourceError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// Stands in for git: clones create an empty checkout, everything else succeeds.
#[derive(Default)]
struct FakeGit {
    clones: AtomicUsize,
}

#[async_trait]
impl CommandRunner for FakeGit {
    async fn run(
        &self,
        spec: CommandSpec,
        _sink: Option<LineSink>,
    ) -> Result<CommandOutput, RunnerError> {
        if spec.program == "git" && spec.args.first().map(String::as_str) == Some("clone") {
            self.clones.fetch_add(1, Ordering::SeqCst);
            let dest = PathBuf::from(spec.args.last().unwrap());
            std::fs::create_dir_all(dest.join(".git")).unwrap();
        }
        Ok(CommandOutput::ok())
    }

    fn is_installed(&self, _program: &str) -> bool {
        false
    }
}

struct Harness {
    service: McpService,
    source: Arc<SwappableSource>,
    _dir: TempDir,
}

fn registry(servers: Vec<ServerConfig>, defaults: &[&str], enabled: bool) -> ServerRegistry {
    ServerRegistry {
        servers,
        default_servers: defaults.iter().map(|d| (*d).to_string()).collect(),
        enabled,
    }
}

fn harness(initial: ServerRegistry) -> Harness {
    harness_with_runner(initial, Arc::new(SystemRunner))
}

fn harness_with_runner(initial: ServerRegistry, runner: Arc<dyn CommandRunner>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let in_process = Arc::new(InProcessRegistry::new());
    in_process.register("notes", Arc::new(Notes));
    let factory = DefaultTransportFactory::new(
        CommandResolver::system(),
        Arc::new(NoCredentials),
        in_process,
    );

    let cache = Arc::new(PackageCache::new(
        dir.path().join("packages"),
        Arc::new(SystemRunner),
        Arc::new(RegistryProber::fixed("https://registry.npmjs.org")),
        Arc::new(HttpNetworkCheck::new(Duration::from_millis(200))),
        Arc::new(NoopEmitter),
    ));
    let fetcher = Arc::new(RepositoryFetcher::new(
        dir.path().join("repos"),
        runner,
        Arc::new(NoopEmitter),
    ));
    let manager = Arc::new(
        McpManager::new(Arc::new(factory), Arc::new(NoopEmitter))
            .with_package_cache(Arc::clone(&cache)),
    );
    let source = Arc::new(SwappableSource(Mutex::new(initial)));

    Harness {
        service: McpService::new(
            Arc::clone(&source) as Arc<dyn ServerConfigSource>,
            manager,
            cache,
            fetcher,
        ),
        source,
        _dir: dir,
    }
}

#[tokio::test]
async fn initialize_starts_defaults_and_tolerates_failures() {
    let h = harness(registry(
        vec![
            ServerConfig::in_memory("notes", "notes"),
            ServerConfig::in_memory("broken", "not-registered"),
            ServerConfig::in_memory("idle", "notes"),
        ],
        &["notes", "broken"],
        true,
    ));

    h.service.initialize().await.unwrap();

    assert!(h.service.is_running("notes").await);
    assert!(!h.service.is_running("broken").await);
    assert!(!h.service.is_running("idle").await);
    let tools = h.service.list_tools("notes").await.unwrap();
    assert_eq!(tools[0].name, "add_note");
}

#[tokio::test]
async fn globally_disabled_starts_nothing() {
    let h = harness(registry(
        vec![ServerConfig::in_memory("notes", "notes")],
        &["notes"],
        false,
    ));

    h.service.initialize().await.unwrap();

    assert!(!h.service.is_running("notes").await);
    assert!(matches!(
        h.service.start_server("notes").await,
        Err(McpServiceError::Config(_))
    ));
}

#[tokio::test]
async fn reload_stops_removed_and_restarts_changed() {
    let h = harness(registry(
        vec![
            ServerConfig::in_memory("notes", "notes"),
            ServerConfig::in_memory("scratch", "notes"),
        ],
        &[],
        true,
    ));
    h.service.initialize().await.unwrap();
    h.service.start_server("notes").await.unwrap();
    h.service.start_server("scratch").await.unwrap();
    let before = h.service.get_client("notes").await.unwrap();

    h.source.set(registry(
        vec![ServerConfig::in_memory("notes", "notes").with_timeout_secs(30)],
        &[],
        true,
    ));
    let summary = h.service.reload_configs().await.unwrap();

    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.removed, vec!["scratch".to_string()]);
    assert_eq!(summary.restarted, vec!["notes".to_string()]);
    assert!(!h.service.is_running("scratch").await);
    assert!(h.service.manager().config("scratch").await.is_none());

    let after = h.service.get_client("notes").await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.config().timeout_secs, Some(30));
    assert!(h.service.is_running("notes").await);
}

#[tokio::test]
async fn unchanged_reload_keeps_clients() {
    let h = harness(registry(
        vec![ServerConfig::in_memory("notes", "notes")],
        &["notes"],
        true,
    ));
    h.service.initialize().await.unwrap();
    let before = h.service.get_client("notes").await.unwrap();

    let summary = h.service.reload_configs().await.unwrap();

    assert!(summary.restarted.is_empty());
    let after = h.service.get_client("notes").await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn empty_cache_reports_nothing() {
    let h = harness(ServerRegistry::default());

    assert!(!h.service.is_package_cached("@scope/server-files"));
    let stats = h.service.cache_stats().unwrap();
    assert_eq!(stats.package_count, 0);
    assert_eq!(h.service.clear_cache().unwrap(), 0);
}

#[tokio::test]
async fn installing_blank_package_fails() {
    let h = harness(ServerRegistry::default());

    let err = h
        .service
        .install_package_to_cache("  ", Some("https://registry.npmjs.org"))
        .await
        .unwrap_err();

    assert!(matches!(err, McpServiceError::Install(_)));
}

#[tokio::test]
async fn fixed_registry_answers_speed_test() {
    let h = harness(ServerRegistry::default());

    let selection = h.service.test_registry_speed().await;

    assert_eq!(selection.registry, "https://registry.npmjs.org");
}

#[tokio::test]
async fn reload_keeps_repository_server_whose_source_is_unchanged() {
    let git = Arc::new(FakeGit::default());
    let config = ServerConfig::in_memory("notes", "notes").with_repository(RepositoryOrigin {
        url: "https://github.com/acme/notes".into(),
        target_name: None,
        label: None,
    });
    let h = harness_with_runner(
        registry(vec![config], &["notes"], true),
        Arc::clone(&git) as Arc<dyn CommandRunner>,
    );
    h.service.initialize().await.unwrap();
    let before = h.service.get_client("notes").await.unwrap();
    assert!(before.config().working_dir.is_some());

    let summary = h.service.reload_configs().await.unwrap();

    assert!(summary.restarted.is_empty());
    let after = h.service.get_client("notes").await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(git.clones.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn changed_repository_server_is_prepared_from_new_config() {
    let origin = RepositoryOrigin {
        url: "https://github.com/acme/notes".into(),
        target_name: None,
        label: None,
    };
    let h = harness_with_runner(
        registry(
            vec![ServerConfig::in_memory("notes", "notes").with_repository(origin.clone())],
            &["notes"],
            true,
        ),
        Arc::new(FakeGit::default()),
    );
    h.service.initialize().await.unwrap();

    h.source.set(registry(
        vec![
            ServerConfig::in_memory("notes", "notes")
                .with_repository(origin)
                .with_timeout_secs(45),
        ],
        &["notes"],
        true,
    ));
    let summary = h.service.reload_configs().await.unwrap();

    assert_eq!(summary.restarted, vec!["notes".to_string()]);
    let client = h.service.get_client("notes").await.unwrap();
    assert_eq!(client.config().timeout_secs, Some(45));
    assert!(client.config().working_dir.is_some());
}
