//! Height probing through a node's monitoring gateway.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Gauge the node exports for its latest decided height.
pub const HEIGHT_METRIC: &str = "papyrus_consensus_height";

/// Path of the Prometheus text endpoint on the monitoring gateway.
pub const METRICS_PATH: &str = "/monitoring/metrics";

/// Reads a node's current consensus height.
///
/// `None` means "unknown": the endpoint is unreachable, the node is not
/// ready yet, or the metric is absent. These are deliberately not told
/// apart, and none of them is an error.
#[async_trait]
pub trait HeightProbe: Send + Sync {
    async fn height(&self, monitoring_port: u16) -> Option<u64>;
}

/// Scrapes `http://127.0.0.1:{port}/monitoring/metrics`.
pub struct HttpHeightProbe {
    client: reqwest::Client,
    metric: String,
}

impl HttpHeightProbe {
    /// Creates a probe for `metric` with a per-request timeout.
    pub fn new(metric: impl Into<String>, timeout: Duration) -> Self {
        // Nodes are always local; proxy environment variables must not apply.
        // Falls back to a default client if the builder fails.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .unwrap_or_default();
        Self {
            client,
            metric: metric.into(),
        }
    }
}

impl Default for HttpHeightProbe {
    fn default() -> Self {
        Self::new(HEIGHT_METRIC, Duration::from_secs(2))
    }
}

#[async_trait]
impl HeightProbe for HttpHeightProbe {
    async fn height(&self, monitoring_port: u16) -> Option<u64> {
        let url = format!("http://127.0.0.1:{}{}", monitoring_port, METRICS_PATH);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Metrics endpoint {} unreachable: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("Metrics endpoint {} returned {}", url, response.status());
            return None;
        }

        let body = response.text().await.ok()?;
        parse_gauge(&body, &self.metric)
    }
}

/// Extracts the integer value of `metric` from a Prometheus text body.
///
/// Matches lines of the form `<metric> <integer>`; labelled samples,
/// comments and other metrics sharing the prefix are ignored.
pub fn parse_gauge(body: &str, metric: &str) -> Option<u64> {
    body.lines().find_map(|line| {
        let rest = line.strip_prefix(metric)?;
        let value = rest.strip_prefix(' ')?.trim();
        value.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SAMPLE: &str = "\
# HELP papyrus_consensus_height The height of consensus
# TYPE papyrus_consensus_height gauge
papyrus_consensus_height 17
papyrus_consensus_height_total 99
papyrus_storage_height 40
";

    #[test]
    fn test_parse_gauge() {
        assert_eq!(parse_gauge(SAMPLE, HEIGHT_METRIC), Some(17));
        assert_eq!(parse_gauge(SAMPLE, "papyrus_storage_height"), Some(40));
    }

    #[test]
    fn test_parse_gauge_absent_or_malformed() {
        assert_eq!(parse_gauge("", HEIGHT_METRIC), None);
        assert_eq!(parse_gauge("papyrus_consensus_height_total 5\n", HEIGHT_METRIC), None);
        assert_eq!(parse_gauge("papyrus_consensus_height abc\n", HEIGHT_METRIC), None);
        assert_eq!(parse_gauge("papyrus_consensus_height -3\n", HEIGHT_METRIC), None);
    }

    /// Serves one canned HTTP response on an ephemeral port.
    async fn serve_once(body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        port
    }

    #[tokio::test]
    async fn test_http_probe_reads_height() {
        let port = serve_once(SAMPLE).await;
        let probe = HttpHeightProbe::default();

        assert_eq!(probe.height(port).await, Some(17));
    }

    #[tokio::test]
    async fn test_http_probe_bypasses_proxy_env() {
        for var in ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
            std::env::set_var(var, "http://127.0.0.1:9");
        }
        let port = serve_once(SAMPLE).await;
        let probe = HttpHeightProbe::default();

        assert_eq!(probe.height(port).await, Some(17));
    }

    #[tokio::test]
    async fn test_http_probe_unreachable_is_unknown() {
        let port = crate::ports::find_free_port().unwrap();
        let probe = HttpHeightProbe::new(HEIGHT_METRIC, Duration::from_millis(500));

        assert_eq!(probe.height(port).await, None);
    }
}
