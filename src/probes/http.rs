use async_trait::async_trait;
use std::time::Duration;

use super::{Probe, ProbeVerdict};
use crate::domain::HttpMethod;

/// Healthy iff the endpoint answers 2xx within the timeout
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    method: HttpMethod,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, url: &str, method: HttpMethod) -> Self {
        Self {
            client,
            url: url.to_string(),
            method,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn probe(&self, timeout: Duration) -> ProbeVerdict {
        let request = match self.method {
            HttpMethod::Get => self.client.get(&self.url),
            HttpMethod::Head => self.client.head(&self.url),
        };

        match request.timeout(timeout).send().await {
            Ok(resp) if resp.status().is_success() => ProbeVerdict::healthy(),
            Ok(resp) => ProbeVerdict::unhealthy(format!("HTTP {}", resp.status())),
            Err(e) if e.is_timeout() => ProbeVerdict::unknown(format!("request timed out: {}", e)),
            Err(e) if e.is_builder() => ProbeVerdict::unknown(format!("malformed request: {}", e)),
            Err(e) => ProbeVerdict::unhealthy(format!("request failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HealthStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection, optionally after a delay
    async fn serve(status_line: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}/health", addr)
    }

    fn probe(url: &str) -> HttpProbe {
        HttpProbe::new(reqwest::Client::new(), url, HttpMethod::Get)
    }

    #[tokio::test]
    async fn test_2xx_is_healthy() {
        let url = serve("200 OK", Duration::ZERO).await;
        let verdict = probe(&url).probe(Duration::from_secs(2)).await;
        assert_eq!(verdict.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_non_2xx_is_unhealthy() {
        let url = serve("503 Service Unavailable", Duration::ZERO).await;
        let verdict = probe(&url).probe(Duration::from_secs(2)).await;
        assert_eq!(verdict.status, HealthStatus::Unhealthy);
        assert!(verdict.detail.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_timeout_is_unknown() {
        let url = serve("200 OK", Duration::from_secs(5)).await;
        let verdict = probe(&url).probe(Duration::from_millis(100)).await;
        assert_eq!(verdict.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unhealthy() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let verdict = probe(&format!("http://{}/", addr))
            .probe(Duration::from_secs(2))
            .await;
        assert_eq!(verdict.status, HealthStatus::Unhealthy);
    }
}
