//! Metrics sink — best-effort fan-out of one payload to N endpoints.
//!
//! The endpoint list is fixed at construction. Each publish renders the
//! samples once and posts the payload to every endpoint concurrently.
//! A failing endpoint is logged and otherwise ignored: it never affects
//! delivery to its siblings or the caller.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sample::{MetricSample, render_payload};

/// Path appended to an endpoint base URL, followed by the job label.
const IMPORT_PATH: &str = "api/v1/import/prometheus/metrics/job";

/// A remote metrics backend: base URL plus bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub auth_token: String,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Full import URL for `job`, e.g.
    /// `https://vm.example/api/v1/import/prometheus/metrics/job/e2elatency-eu/`.
    pub fn push_url(&self, job: &str) -> String {
        format!("{}/{IMPORT_PATH}/{job}/", self.url.trim_end_matches('/'))
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Delivery failure for a single endpoint.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("POST {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("POST {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Delivers a rendered payload to one URL with bearer authentication.
pub trait PushTransport: Send + Sync {
    fn post(
        &self,
        url: &str,
        token: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), PushError>> + Send;
}

/// [`PushTransport`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chainprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PushError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PushTransport for HttpPushTransport {
    async fn post(&self, url: &str, token: &str, body: &str) -> Result<(), PushError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("apikey", token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| PushError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PushError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Fans a sample set out to every configured endpoint.
pub struct MetricsSink<T> {
    endpoints: Arc<[EndpointConfig]>,
    job: String,
    transport: T,
}

impl<T: PushTransport> MetricsSink<T> {
    /// Create a sink over a fixed endpoint list. `job` becomes the last
    /// path segment of every push URL.
    pub fn new(endpoints: Vec<EndpointConfig>, job: impl Into<String>, transport: T) -> Self {
        Self {
            endpoints: endpoints.into(),
            job: job.into(),
            transport,
        }
    }

    pub fn endpoints(&self) -> &[EndpointConfig] {
        &self.endpoints
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Render `samples` once and deliver the payload to every endpoint.
    ///
    /// Never fails: with no endpoints this is a logged no-op, and each
    /// endpoint's delivery error is logged and dropped.
    pub async fn publish(&self, samples: &[MetricSample]) {
        if self.endpoints.is_empty() {
            info!("no metrics endpoints configured, skipping push");
            return;
        }
        if samples.is_empty() {
            debug!("no samples to push");
            return;
        }

        let payload = render_payload(samples);
        let deliveries = self.endpoints.iter().map(|endpoint| {
            let url = endpoint.push_url(&self.job);
            let payload = payload.as_str();
            async move {
                match self.transport.post(&url, &endpoint.auth_token, payload).await {
                    Ok(()) => debug!(endpoint = %url, samples = samples.len(), "metrics pushed"),
                    Err(e) => warn!(endpoint = %url, error = %e, "metrics push failed"),
                }
            }
        });

        join_all(deliveries).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::sample::{Labels, MetricName};

    /// Records every post; fails for URLs containing `fail_marker`.
    #[derive(Default)]
    struct RecordingTransport {
        fail_marker: Option<String>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingTransport {
        fn failing_on(marker: &str) -> Self {
            Self {
                fail_marker: Some(marker.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PushTransport for RecordingTransport {
        async fn post(&self, url: &str, token: &str, body: &str) -> Result<(), PushError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), token.to_string(), body.to_string()));
            match &self.fail_marker {
                Some(marker) if url.contains(marker.as_str()) => Err(PushError::Transport {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                }),
                _ => Ok(()),
            }
        }
    }

    fn samples() -> Vec<MetricSample> {
        let labels = Labels::new().with("chain_name", "evm").unwrap();
        let name = MetricName::new("e2e_latency").unwrap();
        vec![
            MetricSample::new(name.clone(), labels.clone(), 0.09),
            MetricSample::new(name.with_suffix("success").unwrap(), labels, 1.0),
        ]
    }

    fn endpoints(n: usize) -> Vec<EndpointConfig> {
        (1..=n)
            .map(|i| EndpointConfig::new(format!("https://vm{i}.example"), format!("token-{i}")))
            .collect()
    }

    #[test]
    fn push_url_format() {
        let endpoint = EndpointConfig::new("https://vm.example/", "t");
        assert_eq!(
            endpoint.push_url("e2elatency-eu"),
            "https://vm.example/api/v1/import/prometheus/metrics/job/e2elatency-eu/"
        );
    }

    #[test]
    fn endpoint_debug_redacts_token() {
        let endpoint = EndpointConfig::new("https://vm.example", "s3cret");
        let debug = format!("{endpoint:?}");
        assert!(debug.contains("https://vm.example"));
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn publish_attempts_one_call_per_endpoint() {
        for n in 0..4 {
            let sink = MetricsSink::new(endpoints(n), "job", RecordingTransport::default());
            sink.publish(&samples()).await;
            assert_eq!(sink.transport().calls().len(), n, "endpoint count {n}");
        }
    }

    #[tokio::test]
    async fn publish_with_no_endpoints_is_noop() {
        let sink = MetricsSink::new(Vec::new(), "job", RecordingTransport::default());
        sink.publish(&samples()).await;
        assert!(sink.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn publish_sends_same_payload_with_each_token() {
        let sink = MetricsSink::new(endpoints(2), "e2elatency-test", RecordingTransport::default());
        sink.publish(&samples()).await;

        let mut calls = sink.transport().calls();
        calls.sort();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].0,
            "https://vm1.example/api/v1/import/prometheus/metrics/job/e2elatency-test/"
        );
        assert_eq!(calls[0].1, "token-1");
        assert_eq!(calls[1].1, "token-2");
        assert_eq!(calls[0].2, calls[1].2);
        assert_eq!(
            calls[0].2,
            "e2e_latency{chain_name=\"evm\"} 0.09\ne2e_latency_success{chain_name=\"evm\"} 1\n"
        );
    }

    #[tokio::test]
    async fn failing_endpoint_does_not_block_others() {
        let sink = MetricsSink::new(endpoints(3), "job", RecordingTransport::failing_on("vm1."));
        sink.publish(&samples()).await;

        let calls = sink.transport().calls();
        assert_eq!(calls.len(), 3);
        for token in ["token-2", "token-3"] {
            assert!(calls.iter().any(|(_, t, body)| t == token && !body.is_empty()));
        }
    }

    #[tokio::test]
    async fn empty_sample_set_is_not_pushed() {
        let sink = MetricsSink::new(endpoints(2), "job", RecordingTransport::default());
        sink.publish(&[]).await;
        assert!(sink.transport().calls().is_empty());
    }
}
