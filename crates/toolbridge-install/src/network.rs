//! Network reachability check against the package registry.

use std::time::Duration;

use async_trait::async_trait;

/// Answers whether a URL is reachable right now.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkCheck: Send + Sync {
    async fn is_reachable(&self, url: &str) -> bool;
}

/// HEAD request with a bounded timeout; any HTTP answer counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpNetworkCheck {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpNetworkCheck {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }
}

#[async_trait]
impl NetworkCheck for HttpNetworkCheck {
    async fn is_reachable(&self, url: &str) -> bool {
        let request = self.client.head(url).send();
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => {
                tracing::debug!(url, status = %response.status(), "Network check succeeded");
                !response.status().is_server_error()
            }
            Ok(Err(e)) => {
                tracing::debug!(url, error = %e, "Network check failed");
                false
            }
            Err(_) => {
                tracing::debug!(url, timeout_ms = ?self.timeout, "Network check timed out");
                false
            }
        }
    }
}

/// One-shot convenience wrapper around `HttpNetworkCheck`.
pub async fn check_network_connection(url: &str, timeout: Duration) -> bool {
    HttpNetworkCheck::new(timeout).is_reachable(url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unreachable_address_is_false() {
        // Reserved TEST-NET address; the timeout bounds the attempt.
        let reachable =
            check_network_connection("http://192.0.2.1:9", Duration::from_millis(200)).await;
        assert!(!reachable);
    }

    #[tokio::test]
    async fn test_local_server_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let reachable =
            check_network_connection(&format!("http://{addr}/"), Duration::from_secs(2)).await;
        assert!(reachable);
    }
}
