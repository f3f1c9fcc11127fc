//! The probe loop: one adapter call, one publish and one sleep per
//! iteration, forever.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chainprobe_chain::{ChainAdapter, ProbeOutcome};
use chainprobe_metrics::{MetricSample, MetricsSink, PushTransport};
use futures_util::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::latency::LatencyBreakdown;
use crate::samples::ProbeMetrics;

/// Loop state. `Running` covers the adapter call, publishing and the
/// inter-iteration sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Chain identifier, used for log context.
    pub chain_name: String,
    /// Sleep between iterations, regardless of outcome.
    pub interval: Duration,
}

/// What one iteration produced, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: u64,
    pub success: bool,
    pub latency: Option<LatencyBreakdown>,
    /// Error class of a failed iteration.
    pub failure: Option<&'static str>,
    /// Samples handed to the sink.
    pub samples: usize,
}

pub struct ProbeLoop<A, T> {
    adapter: A,
    sink: MetricsSink<T>,
    metrics: ProbeMetrics,
    config: LoopConfig,
    state: LoopState,
    iterations: u64,
}

impl<A: ChainAdapter, T: PushTransport> ProbeLoop<A, T> {
    pub fn new(adapter: A, sink: MetricsSink<T>, metrics: ProbeMetrics, config: LoopConfig) -> Self {
        Self {
            adapter,
            sink,
            metrics,
            config,
            state: LoopState::Idle,
            iterations: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn sink(&self) -> &MetricsSink<T> {
        &self.sink
    }

    /// Run until the process is stopped.
    pub async fn run(&mut self) {
        info!(
            chain = %self.config.chain_name,
            adapter = %self.adapter.kind(),
            interval_ms = self.config.interval.as_millis() as u64,
            endpoints = self.sink.endpoints().len(),
            "probe loop started"
        );
        loop {
            self.tick().await;
        }
    }

    /// One full iteration including the trailing sleep.
    pub async fn tick(&mut self) -> IterationReport {
        let report = self.run_iteration().await;
        tokio::time::sleep(self.config.interval).await;
        self.state = LoopState::Idle;
        report
    }

    async fn run_iteration(&mut self) -> IterationReport {
        self.state = LoopState::Running;
        self.iterations += 1;
        let span = info_span!(
            "probe",
            chain = %self.config.chain_name,
            iteration = self.iterations
        );

        async {
            let outcome = match AssertUnwindSafe(self.adapter.run_once())
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => ProbeOutcome::failure(
                    "panic",
                    format!("adapter panicked: {}", panic_message(panic.as_ref())),
                ),
            };

            let (report, samples) = self.evaluate(&outcome);
            self.sink.publish(&samples).await;
            report
        }
        .instrument(span)
        .await
    }

    /// Turn an outcome into samples. Anything odd about a success
    /// (unmeasurable timeline, unnameable phase) is reported as a failure.
    fn evaluate(&self, outcome: &ProbeOutcome) -> (IterationReport, Vec<MetricSample>) {
        let failed = |kind: &'static str, reason: &str| {
            warn!(kind, error = %reason, "iteration failed");
            let samples = self.metrics.failure_samples();
            let report = IterationReport {
                iteration: self.iterations,
                success: false,
                latency: None,
                failure: Some(kind),
                samples: samples.len(),
            };
            (report, samples)
        };

        let timeline = match outcome {
            ProbeOutcome::Success { timeline } => timeline,
            ProbeOutcome::Failure { kind, error } => return failed(kind, error.as_str()),
        };
        let Some(breakdown) = LatencyBreakdown::from_timeline(timeline) else {
            return failed("timeline", "timeline has fewer than two phase marks");
        };
        let samples = match self.metrics.success_samples(&breakdown) {
            Ok(samples) => samples,
            Err(e) => {
                error!(error = %e, "cannot name latency samples");
                return failed("metric", e.to_string().as_str());
            }
        };

        info!(latency = %breakdown, "iteration succeeded");
        for phase in &breakdown.phases {
            debug!(phase = phase.phase, seconds = phase.seconds, "phase latency");
        }
        let report = IterationReport {
            iteration: self.iterations,
            success: true,
            latency: Some(breakdown),
            failure: None,
            samples: samples.len(),
        };
        (report, samples)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
