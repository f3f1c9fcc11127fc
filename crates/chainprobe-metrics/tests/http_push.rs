//! HTTP push tests.
//!
//! Runs the real `HttpPushTransport` against an in-process axum server
//! that mimics a VictoriaMetrics import endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use chainprobe_metrics::*;

#[derive(Debug, Clone)]
struct Received {
    job: String,
    authorization: Option<String>,
    apikey: Option<String>,
    body: String,
}

type Inbox = Arc<Mutex<Vec<Received>>>;

async fn import(
    State(inbox): State<Inbox>,
    Path(job): Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    inbox.lock().unwrap().push(Received {
        job,
        authorization: header("authorization"),
        apikey: header("apikey"),
        body,
    });
    StatusCode::NO_CONTENT
}

async fn rejecting() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn spawn_backend(inbox: Inbox) -> String {
    let router = Router::new()
        .route("/api/v1/import/prometheus/metrics/job/{job}/", post(import))
        .route("/denied/api/v1/import/prometheus/metrics/job/{job}/", post(rejecting))
        .with_state(inbox);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn samples() -> Vec<MetricSample> {
    let labels = Labels::new().with("chain_name", "sui").unwrap();
    let base = MetricName::new("e2e_shared_obj_incr_txn_latency_sui").unwrap();
    vec![
        MetricSample::new(base.clone(), labels.clone(), 0.42),
        MetricSample::new(base.with_suffix("success").unwrap(), labels, 1.0),
    ]
}

#[tokio::test]
async fn pushes_payload_with_bearer_and_apikey() {
    let inbox = Inbox::default();
    let base = spawn_backend(inbox.clone()).await;

    let transport = HttpPushTransport::new(Duration::from_secs(5)).unwrap();
    let sink = MetricsSink::new(
        vec![EndpointConfig::new(base, "tok-1")],
        "e2elatency-sui",
        transport,
    );
    sink.publish(&samples()).await;

    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].job, "e2elatency-sui");
    assert_eq!(received[0].authorization.as_deref(), Some("Bearer tok-1"));
    assert_eq!(received[0].apikey.as_deref(), Some("tok-1"));
    assert_eq!(
        received[0].body,
        "e2e_shared_obj_incr_txn_latency_sui{chain_name=\"sui\"} 0.42\n\
         e2e_shared_obj_incr_txn_latency_sui_success{chain_name=\"sui\"} 1\n"
    );
}

#[tokio::test]
async fn unreachable_endpoint_does_not_affect_healthy_one() {
    let inbox = Inbox::default();
    let base = spawn_backend(inbox.clone()).await;

    let transport = HttpPushTransport::new(Duration::from_secs(2)).unwrap();
    let sink = MetricsSink::new(
        vec![
            EndpointConfig::new("http://127.0.0.1:1", "dead"),
            EndpointConfig::new(format!("{base}/denied"), "denied"),
            EndpointConfig::new(base, "alive"),
        ],
        "job",
        transport,
    );
    sink.publish(&samples()).await;

    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].apikey.as_deref(), Some("alive"));
}

#[tokio::test]
async fn non_success_status_is_reported_as_error() {
    let inbox = Inbox::default();
    let base = spawn_backend(inbox).await;

    let transport = HttpPushTransport::new(Duration::from_secs(2)).unwrap();
    let url = EndpointConfig::new(format!("{base}/denied"), "t").push_url("job");
    let err = transport.post(&url, "t", "m 1\n").await.unwrap_err();
    assert!(matches!(err, PushError::Status { status: 401, .. }));
}
