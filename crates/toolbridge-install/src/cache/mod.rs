//! Local package cache.
//!
//! Packages are installed with npm into isolated, name-keyed directories under
//! `<data_root>/package-cache` so that launching a server never depends on the
//! network once its package has been fetched.
//!
//! ```text
//! package-cache/
//!   .npm/                                   npm download cache
//!   @modelcontextprotocol+server-memory/
//!     .toolbridge-package.json              manifest
//!     node_modules/@modelcontextprotocol/server-memory/...
//! ```
//!
//! Entries never expire; only `clear_cache` removes them.

mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use toolbridge_core::{AppEvent, AppEventEmitter, InstallEvent};

use crate::network::NetworkCheck;
use crate::registry::RegistryProber;
use crate::runner::{CommandRunner, CommandSpec, LineSink, RunnerError};

pub use manifest::{
    CachedPackage, MANIFEST_FILE_NAME, bare_package_name, cache_dir_name, package_for_command,
};
use manifest::InstalledPackageJson;

/// Errors from package cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Package name cannot be empty")]
    EmptyPackage,

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("npm install {package} failed: {reason}")]
    InstallFailed { package: String, reason: String },
}

impl CacheError {
    fn io(path: &Path, e: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

/// Aggregate cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub package_count: usize,
    pub total_bytes: u64,
    pub packages: Vec<String>,
}

/// Name-keyed package installs under one root directory.
pub struct PackageCache {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    prober: Arc<RegistryProber>,
    network: Arc<dyn NetworkCheck>,
    emitter: Arc<dyn AppEventEmitter>,
}

impl PackageCache {
    pub fn new(
        root: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<RegistryProber>,
        network: Arc<dyn NetworkCheck>,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        Self {
            root: root.into(),
            runner,
            prober,
            network,
            emitter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prober(&self) -> &Arc<RegistryProber> {
        &self.prober
    }

    /// Install directory for a package spec.
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.root.join(cache_dir_name(package))
    }

    /// Whether a manifest exists for the package (version suffix ignored).
    pub fn is_cached(&self, package: &str) -> bool {
        self.package_dir(package).join(MANIFEST_FILE_NAME).is_file()
    }

    /// Manifest of a cached package.
    pub fn cached_package(&self, package: &str) -> Result<Option<CachedPackage>, CacheError> {
        CachedPackage::read(&self.package_dir(package))
    }

    /// Install a package into its isolated cache directory.
    pub async fn install_to_cache(
        &self,
        package: &str,
        registry: &str,
    ) -> Result<CachedPackage, CacheError> {
        let package = package.trim();
        if package.is_empty() {
            return Err(CacheError::EmptyPackage);
        }
        let bare = bare_package_name(package).to_string();
        let install_dir = self.package_dir(package);
        std::fs::create_dir_all(&install_dir).map_err(|e| CacheError::io(&install_dir, &e))?;

        tracing::info!(package = %package, registry, dir = %install_dir.display(), "Installing package to cache");
        self.emitter.emit(AppEvent::install(InstallEvent::Started {
            package: bare.clone(),
        }));

        let prefix = install_dir.to_string_lossy().into_owned();
        let spec = CommandSpec::new(
            npm_program(),
            [
                "install",
                package,
                "--prefix",
                prefix.as_str(),
                "--registry",
                registry,
                "--no-audit",
                "--no-fund",
                "--no-save",
            ],
        )
        .current_dir(&install_dir)
        .env(
            "npm_config_cache",
            self.root.join(".npm").to_string_lossy().into_owned(),
        )
        .env("npm_config_update_notifier", "false");

        let emitter = Arc::clone(&self.emitter);
        let sink_package = bare.clone();
        let sink: LineSink = Arc::new(move |line: &str| {
            emitter.emit(AppEvent::install(InstallEvent::Progress {
                package: sink_package.clone(),
                line: line.to_string(),
            }));
        });

        let result = self.run_install(spec, sink, &bare, &install_dir, registry).await;

        match &result {
            Ok(cached) => {
                tracing::info!(package = %bare, version = ?cached.version, "Package cached");
                self.emitter.emit(AppEvent::install(InstallEvent::Completed {
                    package: bare,
                    version: cached.version.clone(),
                }));
            }
            Err(e) => {
                tracing::warn!(package = %bare, error = %e, "Package install failed");
                self.emitter.emit(AppEvent::install(InstallEvent::Failed {
                    package: bare,
                    error: e.to_string(),
                }));
            }
        }

        result
    }

    async fn run_install(
        &self,
        spec: CommandSpec,
        sink: LineSink,
        package: &str,
        install_dir: &Path,
        registry: &str,
    ) -> Result<CachedPackage, CacheError> {
        let output = self.runner.run(spec, Some(sink)).await?;
        if !output.success {
            return Err(CacheError::InstallFailed {
                package: package.to_string(),
                reason: output.failure_reason(),
            });
        }

        let package_dir = install_dir.join("node_modules").join(package);
        let package_json_path = package_dir.join("package.json");
        let installed: InstalledPackageJson = match std::fs::read_to_string(&package_json_path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| CacheError::Manifest {
                path: package_json_path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) => {
                tracing::warn!(path = %package_json_path.display(), error = %e, "Installed package.json not readable");
                InstalledPackageJson::default()
            }
        };

        let cached = CachedPackage {
            package: package.to_string(),
            version: installed.version.clone(),
            install_dir: install_dir.to_path_buf(),
            entry: installed.main.as_ref().map(|m| package_dir.join(m)),
            bin: installed.bin_map(package, &package_dir),
            registry: registry.to_string(),
            installed_at: chrono::Utc::now(),
        };
        cached.write()?;
        Ok(cached)
    }

    /// Ensure a package is cached, installing it when the network allows.
    ///
    /// Returns `false` instead of failing when offline or when the install
    /// fails; callers fall back to launching through the network.
    pub async fn smart_install(&self, package: &str) -> bool {
        if self.is_cached(package) {
            tracing::debug!(package, "Package already cached");
            return true;
        }

        let registry = self.prober.fastest_url().await;
        if !self.network.is_reachable(&registry).await {
            tracing::info!(package, registry = %registry, "Registry unreachable, skipping install");
            return false;
        }

        match self.install_to_cache(package, &registry).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(package, error = %e, "Smart install failed");
                false
            }
        }
    }

    /// Remove every cached package. Returns how many were removed.
    pub fn clear_cache(&self) -> Result<usize, CacheError> {
        let count = self.list_packages()?.len();
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, &e))?;
        }
        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, &e))?;
        tracing::info!(count, root = %self.root.display(), "Package cache cleared");
        Ok(count)
    }

    /// Package count, names and total size on disk.
    pub fn cache_stats(&self) -> Result<CacheStats, CacheError> {
        let packages = self.list_packages()?;
        let total_bytes = if self.root.exists() {
            dir_size(&self.root)?
        } else {
            0
        };
        Ok(CacheStats {
            package_count: packages.len(),
            total_bytes,
            packages: packages.into_iter().map(|p| p.package).collect(),
        })
    }

    /// Manifests of every cached package, sorted by name.
    pub fn list_packages(&self) -> Result<Vec<CachedPackage>, CacheError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.root, &e)),
        };

        let mut packages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.root, &e))?;
            if !entry.path().is_dir() {
                continue;
            }
            match CachedPackage::read(&entry.path()) {
                Ok(Some(package)) => packages.push(package),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable cache entry"),
            }
        }
        packages.sort_by(|a, b| a.package.cmp(&b.package));
        Ok(packages)
    }
}

fn npm_program() -> &'static str {
    if cfg!(windows) { "npm.cmd" } else { "npm" }
}

fn dir_size(path: &Path) -> Result<u64, CacheError> {
    let mut total = 0;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, &e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&dir, &e))?;
            let meta = entry
                .metadata()
                .map_err(|e| CacheError::io(&entry.path(), &e))?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MockNetworkCheck;
    use crate::runner::{CommandOutput, MockCommandRunner};
    use tempfile::TempDir;
    use toolbridge_core::{ChannelEmitter, NoopEmitter};

    const REGISTRY: &str = "https://registry.example";

    fn prober() -> Arc<RegistryProber> {
        Arc::new(RegistryProber::fixed(REGISTRY))
    }

    fn reachable(value: bool) -> Arc<MockNetworkCheck> {
        let mut network = MockNetworkCheck::new();
        network.expect_is_reachable().returning(move |_| value);
        Arc::new(network)
    }

    /// Runner that fakes a successful npm install by writing package.json.
    fn fake_npm(times: usize) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(times)
            .returning(|spec: CommandSpec, sink: Option<LineSink>| {
                assert!(spec.program.starts_with("npm"));
                assert!(spec.args.contains(&"--no-save".to_string()));
                let prefix_idx = spec.args.iter().position(|a| a == "--prefix").unwrap();
                let prefix = PathBuf::from(&spec.args[prefix_idx + 1]);
                let package = bare_package_name(&spec.args[1]).to_string();

                let package_dir = prefix.join("node_modules").join(&package);
                std::fs::create_dir_all(&package_dir).unwrap();
                std::fs::write(
                    package_dir.join("package.json"),
                    r#"{"version": "1.4.0", "main": "dist/index.js", "bin": {"srv": "dist/cli.js"}}"#,
                )
                .unwrap();

                if let Some(sink) = sink {
                    sink("added 12 packages");
                }
                Ok(CommandOutput::ok())
            });
        runner
    }

    #[tokio::test]
    async fn test_install_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let emitter = ChannelEmitter::new(16);
        let mut events = emitter.subscribe();
        let cache = PackageCache::new(
            dir.path(),
            Arc::new(fake_npm(1)),
            prober(),
            reachable(true),
            Arc::new(emitter),
        );

        let cached = cache
            .install_to_cache("@scope/server@1.4.0", REGISTRY)
            .await
            .unwrap();

        assert_eq!(cached.package, "@scope/server");
        assert_eq!(cached.version.as_deref(), Some("1.4.0"));
        assert!(cached.entry.unwrap().ends_with("dist/index.js"));
        assert!(cached.bin.contains_key("srv"));
        assert!(cache.is_cached("@scope/server"));
        assert!(dir.path().join("@scope+server").join(MANIFEST_FILE_NAME).is_file());

        let first = events.recv().await.unwrap();
        assert_eq!(first.event_name(), "install:started");
        let second = events.recv().await.unwrap();
        assert!(matches!(
            second,
            AppEvent::Install { event: InstallEvent::Progress { ref line, .. } } if line == "added 12 packages"
        ));
    }

    #[tokio::test]
    async fn test_install_failure_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::failed(1, "npm ERR! 404 Not Found")));
        let cache = PackageCache::new(
            dir.path(),
            Arc::new(runner),
            prober(),
            reachable(true),
            Arc::new(NoopEmitter::new()),
        );

        let err = cache.install_to_cache("nope", REGISTRY).await.unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!cache.is_cached("nope"));
    }

    #[tokio::test]
    async fn test_smart_install_hits_cache_without_network() {
        let dir = TempDir::new().unwrap();
        let cache = PackageCache::new(
            dir.path(),
            Arc::new(fake_npm(1)),
            prober(),
            reachable(true),
            Arc::new(NoopEmitter::new()),
        );

        assert!(cache.smart_install("tool").await);
        // Second call must not run npm again (times(1) above).
        assert!(cache.smart_install("tool@2.0.0").await);
    }

    #[tokio::test]
    async fn test_smart_install_offline_returns_false() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();
        let cache = PackageCache::new(
            dir.path(),
            Arc::new(runner),
            prober(),
            reachable(false),
            Arc::new(NoopEmitter::new()),
        );

        assert!(!cache.smart_install("tool").await);
    }

    #[tokio::test]
    async fn test_smart_install_swallows_failures() {
        let dir = TempDir::new().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::failed(1, "boom")));
        let cache = PackageCache::new(
            dir.path(),
            Arc::new(runner),
            prober(),
            reachable(true),
            Arc::new(NoopEmitter::new()),
        );

        assert!(!cache.smart_install("tool").await);
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = PackageCache::new(
            dir.path().join("cache"),
            Arc::new(fake_npm(2)),
            prober(),
            reachable(true),
            Arc::new(NoopEmitter::new()),
        );
        assert_eq!(cache.cache_stats().unwrap(), CacheStats::default());

        cache.install_to_cache("b-tool", REGISTRY).await.unwrap();
        cache.install_to_cache("a-tool", REGISTRY).await.unwrap();

        let stats = cache.cache_stats().unwrap();
        assert_eq!(stats.package_count, 2);
        assert_eq!(stats.packages, vec!["a-tool", "b-tool"]);
        assert!(stats.total_bytes > 0);

        assert_eq!(cache.clear_cache().unwrap(), 2);
        assert!(!cache.is_cached("a-tool"));
        assert_eq!(cache.cache_stats().unwrap().package_count, 0);
    }
}
