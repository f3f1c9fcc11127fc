//! End-to-end iteration through the public API: scripted adapter, real
//! latency and naming, recording transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chainprobe_chain::{AdapterKind, ChainAdapter, PhaseTimeline, ProbeOutcome, phase};
use chainprobe_engine::*;
use chainprobe_metrics::{
    EndpointConfig, Labels, MetricName, MetricsSink, PushError, PushTransport,
};
use tokio::time::Instant;

/// Succeeds with marks at 0, 10, 40 and 90 ms.
struct FixedTimeline;

impl ChainAdapter for FixedTimeline {
    fn kind(&self) -> AdapterKind {
        AdapterKind::AccountTransfer
    }

    async fn run_once(&mut self) -> ProbeOutcome {
        let base = Instant::now();
        let mut timeline = PhaseTimeline::new();
        for (name, ms) in [
            (phase::START, 0),
            (phase::BUILD, 10),
            (phase::SUBMIT, 40),
            (phase::CONFIRM, 90),
        ] {
            timeline.mark_at(name, base + Duration::from_millis(ms));
        }
        ProbeOutcome::Success { timeline }
    }
}

/// Fails on odd calls, succeeds on even ones.
struct Flaky {
    calls: u32,
}

impl ChainAdapter for Flaky {
    fn kind(&self) -> AdapterKind {
        AdapterKind::LedgerTransfer
    }

    async fn run_once(&mut self) -> ProbeOutcome {
        self.calls += 1;
        if self.calls % 2 == 1 {
            return ProbeOutcome::failure("timeout", "confirmation timed out after 500ms");
        }
        let mut timeline = PhaseTimeline::start();
        timeline.mark_at(phase::CONFIRM, Instant::now() + Duration::from_millis(250));
        ProbeOutcome::Success { timeline }
    }
}

#[derive(Clone, Default)]
struct Recorder {
    posts: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl PushTransport for Recorder {
    async fn post(&self, url: &str, token: &str, body: &str) -> Result<(), PushError> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), token.to_string(), body.to_string()));
        Ok(())
    }
}

fn build<A: ChainAdapter>(
    adapter: A,
    endpoints: Vec<EndpointConfig>,
) -> (ProbeLoop<A, Recorder>, Recorder) {
    let recorder = Recorder::default();
    let sink = MetricsSink::new(endpoints, "e2elatency-default", recorder.clone());
    let metrics = ProbeMetrics::new(
        MetricName::new("e2e_p2p_txn_latency").unwrap(),
        Labels::new().with("chain_name", "testnet").unwrap(),
    )
    .unwrap();
    let probe = ProbeLoop::new(
        adapter,
        sink,
        metrics,
        LoopConfig {
            chain_name: "testnet".into(),
            interval: Duration::from_millis(1000),
        },
    );
    (probe, recorder)
}

#[tokio::test(start_paused = true)]
async fn five_samples_in_one_post() {
    let (mut probe, recorder) = build(
        FixedTimeline,
        vec![EndpointConfig::new("https://vm.example/", "secret")],
    );

    let report = probe.tick().await;
    assert!(report.success);
    assert_eq!(report.samples, 5);

    let posts = recorder.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 1);
    let (url, token, body) = &posts[0];
    assert_eq!(
        url,
        "https://vm.example/api/v1/import/prometheus/metrics/job/e2elatency-default/"
    );
    assert_eq!(token, "secret");
    assert_eq!(
        body,
        "e2e_p2p_txn_latency_build{chain_name=\"testnet\"} 0.01\n\
         e2e_p2p_txn_latency_submit{chain_name=\"testnet\"} 0.03\n\
         e2e_p2p_txn_latency_confirm{chain_name=\"testnet\"} 0.05\n\
         e2e_p2p_txn_latency{chain_name=\"testnet\"} 0.09\n\
         e2e_p2p_txn_latency_success{chain_name=\"testnet\"} 1\n"
    );
}

#[tokio::test(start_paused = true)]
async fn every_endpoint_gets_the_same_payload() {
    let (mut probe, recorder) = build(
        FixedTimeline,
        vec![
            EndpointConfig::new("https://a.example", "a"),
            EndpointConfig::new("https://b.example", "b"),
            EndpointConfig::new("https://c.example", "c"),
        ],
    );
    probe.tick().await;

    let posts = recorder.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 3);
    assert!(posts.iter().all(|(_, _, body)| *body == posts[0].2));
}

#[tokio::test(start_paused = true)]
async fn no_endpoints_is_a_quiet_no_op() {
    let (mut probe, recorder) = build(FixedTimeline, Vec::new());
    let report = probe.tick().await;
    assert!(report.success);
    assert!(recorder.posts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn alternating_outcomes_keep_iterations_independent() {
    let (mut probe, recorder) = build(
        Flaky { calls: 0 },
        vec![EndpointConfig::new("https://vm.example", "t")],
    );
    let started = Instant::now();

    let reports = [
        probe.tick().await,
        probe.tick().await,
        probe.tick().await,
    ];
    assert_eq!(
        reports.iter().map(|r| r.success).collect::<Vec<_>>(),
        vec![false, true, false]
    );
    assert_eq!(reports[0].failure, Some("timeout"));
    assert_eq!(reports[1].failure, None);
    assert_eq!(probe.iterations(), 3);
    assert_eq!(probe.state(), LoopState::Idle);
    assert_eq!(started.elapsed(), Duration::from_secs(3));

    let bodies: Vec<_> = recorder
        .posts
        .lock()
        .unwrap()
        .iter()
        .map(|(_, _, body)| body.clone())
        .collect();
    assert_eq!(
        bodies,
        vec![
            "e2e_p2p_txn_latency_success{chain_name=\"testnet\"} 0\n".to_string(),
            "e2e_p2p_txn_latency_confirm{chain_name=\"testnet\"} 0.25\n\
             e2e_p2p_txn_latency{chain_name=\"testnet\"} 0.25\n\
             e2e_p2p_txn_latency_success{chain_name=\"testnet\"} 1\n"
                .to_string(),
            "e2e_p2p_txn_latency_success{chain_name=\"testnet\"} 0\n".to_string(),
        ]
    );
}
