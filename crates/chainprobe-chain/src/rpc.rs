//! Minimal JSON-RPC 2.0 client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::trace;

use crate::error::{ProbeError, ProbeResult};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    /// Structured reason some nodes attach next to a generic message.
    #[serde(default)]
    cause: Option<ErrorCause>,
}

#[derive(Debug, Deserialize)]
struct ErrorCause {
    name: String,
}

impl RpcErrorObject {
    fn into_error(self) -> ProbeError {
        let message = match self.cause {
            Some(cause) => format!("{} ({})", self.message, cause.name),
            None => self.message,
        };
        ProbeError::Rpc {
            code: self.code,
            message,
        }
    }
}

/// JSON-RPC endpoint with a per-request timeout.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ProbeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chainprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its `result`.
    ///
    /// A `null` result decodes into `Option<T>` as `None`; an `error`
    /// member becomes [`ProbeError::Rpc`].
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ProbeResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "rpc request");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| ProbeError::Protocol(format!("{method} (HTTP {status}): {e}")))?;

        if let Some(error) = envelope.error {
            return Err(error.into_error());
        }
        serde_json::from_value(envelope.result)
            .map_err(|e| ProbeError::Protocol(format!("{method}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_null_result() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(envelope.error.is_none());
        let decoded: Option<String> = serde_json::from_value(envelope.result).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn envelope_with_error_and_no_result() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        let error = envelope.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "nonce too low");
        assert!(envelope.result.is_null());
    }

    #[test]
    fn error_cause_is_kept_in_the_message() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"name":"HANDLER_ERROR","cause":{"info":{},"name":"UNKNOWN_TRANSACTION"},"code":-32000,"message":"Server error"}}"#,
        )
        .unwrap();
        let err = envelope.error.unwrap().into_error();
        assert_eq!(err.to_string(), "rpc error -32000: Server error (UNKNOWN_TRANSACTION)");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let client = JsonRpcClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client
            .call::<String>("eth_chainId", json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
