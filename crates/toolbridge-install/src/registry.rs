//! Package registry mirror probing.
//!
//! Mirrors are probed concurrently; the first one to answer wins. The choice
//! is made once per prober and reused afterwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Built-in mirror list, in fallback order.
pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://registry.npmjs.org",
    "https://registry.npmmirror.com",
    "https://mirrors.cloud.tencent.com/npm",
    "https://repo.huaweicloud.com/repository/npm",
];

/// Why a single probe failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {0}")]
    Status(u16),
}

/// Checks whether one registry answers.
#[async_trait]
pub trait RegistryProbe: Send + Sync {
    async fn probe(&self, registry: &str) -> Result<(), ProbeError>;
}

/// Package whose metadata document every mirror is expected to serve.
pub const PROBE_PACKAGE: &str = "lodash";

/// Probes a registry by fetching the metadata of a well-known package.
///
/// Only a 2xx counts: a mirror that is up but cannot serve packages (wrong
/// base path, empty proxy) must not win the race.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    package: String,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            package: PROBE_PACKAGE.to_string(),
        }
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }
}

#[async_trait]
impl RegistryProbe for HttpProbe {
    async fn probe(&self, registry: &str) -> Result<(), ProbeError> {
        let url = format!("{}/{}", registry.trim_end_matches('/'), self.package);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.npm.install-v1+json")
            .send()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

/// Outcome of probing one mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub registry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The mirror picked by a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySelection {
    pub registry: String,
    /// `None` when every probe failed and the first mirror was used.
    pub latency_ms: Option<u64>,
}

/// Races a mirror list and remembers the winner.
pub struct RegistryProber {
    mirrors: Vec<String>,
    probe: Arc<dyn RegistryProbe>,
    timeout: Duration,
    selected: OnceCell<RegistrySelection>,
}

impl std::fmt::Debug for RegistryProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryProber")
            .field("mirrors", &self.mirrors)
            .field("timeout", &self.timeout)
            .field("selected", &self.selected.get())
            .finish_non_exhaustive()
    }
}

impl RegistryProber {
    pub fn new(mirrors: Vec<String>, probe: Arc<dyn RegistryProbe>, timeout: Duration) -> Self {
        let mirrors = if mirrors.is_empty() {
            DEFAULT_MIRRORS.iter().map(|m| (*m).to_string()).collect()
        } else {
            mirrors
        };
        Self {
            mirrors,
            probe,
            timeout,
            selected: OnceCell::new(),
        }
    }

    /// Built-in mirrors probed over HTTP.
    pub fn with_defaults(timeout: Duration) -> Self {
        Self::new(Vec::new(), Arc::new(HttpProbe::new()), timeout)
    }

    /// A prober that never probes and always answers `registry`.
    pub fn fixed(registry: impl Into<String>) -> Self {
        let registry = registry.into();
        let prober = Self::new(
            vec![registry.clone()],
            Arc::new(HttpProbe::new()),
            Duration::ZERO,
        );
        let _ = prober.selected.set(RegistrySelection {
            registry,
            latency_ms: None,
        });
        prober
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Fastest registry, probing on first use only.
    pub async fn fastest(&self) -> RegistrySelection {
        self.selected
            .get_or_init(|| async { self.race().await })
            .await
            .clone()
    }

    /// URL of the fastest registry.
    pub async fn fastest_url(&self) -> String {
        self.fastest().await.registry
    }

    async fn race(&self) -> RegistrySelection {
        let mut probes: FuturesUnordered<_> =
            self.mirrors.iter().map(|m| self.timed_probe(m)).collect();

        while let Some(report) = probes.next().await {
            if let Some(latency_ms) = report.latency_ms {
                tracing::info!(registry = %report.registry, latency_ms, "Selected package registry");
                return RegistrySelection {
                    registry: report.registry,
                    latency_ms: Some(latency_ms),
                };
            }
            tracing::debug!(
                registry = %report.registry,
                error = report.error.as_deref().unwrap_or_default(),
                "Registry probe failed"
            );
        }

        let fallback = self.mirrors[0].clone();
        tracing::warn!(registry = %fallback, "All registry probes failed, using first mirror");
        RegistrySelection {
            registry: fallback,
            latency_ms: None,
        }
    }

    /// Probe every mirror and report all results, fastest first.
    pub async fn measure_all(&self) -> Vec<ProbeReport> {
        let mut reports: Vec<ProbeReport> = self
            .mirrors
            .iter()
            .map(|m| self.timed_probe(m))
            .collect::<FuturesUnordered<_>>()
            .collect()
            .await;
        reports.sort_by_key(|r| r.latency_ms.unwrap_or(u64::MAX));
        reports
    }

    async fn timed_probe(&self, registry: &str) -> ProbeReport {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.probe.probe(registry)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(duration_ms(self.timeout))),
        };

        match outcome {
            Ok(()) => ProbeReport {
                registry: registry.to_string(),
                latency_ms: Some(duration_ms(started.elapsed())),
                error: None,
            },
            Err(e) => ProbeReport {
                registry: registry.to_string(),
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers after a per-registry delay; `None` never answers.
    struct DelayProbe {
        delays: HashMap<String, Option<Duration>>,
        calls: AtomicUsize,
    }

    impl DelayProbe {
        fn new(delays: &[(&str, Option<u64>)]) -> Self {
            Self {
                delays: delays
                    .iter()
                    .map(|(r, d)| ((*r).to_string(), d.map(Duration::from_millis)))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RegistryProbe for DelayProbe {
        async fn probe(&self, registry: &str) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.delays.get(registry).copied().flatten() {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                None => std::future::pending().await,
            }
        }
    }

    fn mirrors(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[tokio::test]
    async fn test_fastest_mirror_wins_race() {
        let probe = Arc::new(DelayProbe::new(&[
            ("https://slow", Some(200)),
            ("https://fast", Some(50)),
            ("https://dead", None),
        ]));
        let prober = RegistryProber::new(
            mirrors(&["https://slow", "https://fast", "https://dead"]),
            probe,
            Duration::from_millis(500),
        );

        let selection = prober.fastest().await;

        assert_eq!(selection.registry, "https://fast");
        assert!(selection.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_all_failures_fall_back_to_first() {
        let probe = Arc::new(DelayProbe::new(&[("https://a", None), ("https://b", None)]));
        let prober = RegistryProber::new(
            mirrors(&["https://a", "https://b"]),
            probe,
            Duration::from_millis(30),
        );

        let selection = prober.fastest().await;

        assert_eq!(selection.registry, "https://a");
        assert_eq!(selection.latency_ms, None);
    }

    #[tokio::test]
    async fn test_selection_is_cached() {
        let probe = Arc::new(DelayProbe::new(&[("https://a", Some(1))]));
        let prober = RegistryProber::new(
            mirrors(&["https://a"]),
            Arc::clone(&probe) as Arc<dyn RegistryProbe>,
            Duration::from_millis(200),
        );

        prober.fastest().await;
        prober.fastest().await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_measure_all_sorts_by_latency() {
        let probe = Arc::new(DelayProbe::new(&[
            ("https://slow", Some(80)),
            ("https://fast", Some(5)),
            ("https://dead", None),
        ]));
        let prober = RegistryProber::new(
            mirrors(&["https://slow", "https://fast", "https://dead"]),
            probe,
            Duration::from_millis(300),
        );

        let reports = prober.measure_all().await;

        assert_eq!(reports[0].registry, "https://fast");
        assert_eq!(reports[1].registry, "https://slow");
        assert!(reports[2].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_fixed_never_probes() {
        let prober = RegistryProber::fixed("https://registry.example");
        assert_eq!(prober.fastest_url().await, "https://registry.example");
    }

    #[test]
    fn test_empty_mirror_list_uses_defaults() {
        let prober = RegistryProber::new(
            Vec::new(),
            Arc::new(HttpProbe::new()),
            Duration::from_secs(1),
        );
        assert_eq!(prober.mirrors().len(), DEFAULT_MIRRORS.len());
    }

    /// Serves one request, answering `status` only for `GET /<package>`.
    async fn one_shot_registry(package: &'static str, status: u16) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let code = if request.starts_with(&format!("GET /{package} ")) {
                status
            } else {
                404
            };
            let reply = format!("HTTP/1.1 {code} X\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{{}}");
            socket.write_all(reply.as_bytes()).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_http_check_fetches_known_package() {
        let registry = one_shot_registry(PROBE_PACKAGE, 200).await;
        assert_eq!(HttpProbe::new().probe(&registry).await, Ok(()));
    }

    #[tokio::test]
    async fn test_http_check_rejects_not_found() {
        let registry = one_shot_registry(PROBE_PACKAGE, 404).await;
        assert_eq!(
            HttpProbe::new().probe(&registry).await,
            Err(ProbeError::Status(404))
        );
    }

    #[tokio::test]
    async fn test_http_check_custom_package() {
        let registry = one_shot_registry("left-pad", 200).await;
        let probe = HttpProbe::new().with_package("left-pad");
        assert_eq!(probe.probe(&registry).await, Ok(()));
    }
}
