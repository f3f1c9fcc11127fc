//! chainprobe-engine — the continuous measurement loop.
//!
//! One [`ProbeLoop`] runs per chain process. Each iteration asks the
//! chain adapter for one [`ProbeOutcome`](chainprobe_chain::ProbeOutcome),
//! turns it into latency and success samples and publishes them through
//! the metrics sink before sleeping for the ping interval.
//!
//! # Architecture
//!
//! ```text
//! ProbeLoop<A: ChainAdapter, T: PushTransport>
//!   ├── Idle → Running: adapter.run_once()   (panics become Failure)
//!   ├── LatencyBreakdown::from_timeline()    (phase + total seconds)
//!   ├── ProbeMetrics::samples()              (B, B_<phase>, B_success)
//!   ├── MetricsSink::publish()               (fan-out, never fails)
//!   └── sleep(interval) → Idle
//! ```
//!
//! A failed iteration emits only `B_success 0`; there is never a latency
//! sample for it.

pub mod latency;
pub mod probe_loop;
pub mod samples;

pub use latency::{LatencyBreakdown, PhaseLatency};
pub use probe_loop::{IterationReport, LoopConfig, LoopState, ProbeLoop};
pub use samples::ProbeMetrics;
