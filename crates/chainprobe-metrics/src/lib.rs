//! chainprobe-metrics — single-sample exposition and push fan-out.
//!
//! Turns probe measurements into Prometheus text exposition lines and
//! pushes one payload per probe iteration to every configured remote
//! backend (VictoriaMetrics-style `/api/v1/import/prometheus` endpoints).
//!
//! # Architecture
//!
//! ```text
//! MetricSample (name, labels, value)
//!   └── render() → `name{k="v",...} value`
//!
//! MetricsSink
//!   ├── endpoints: [EndpointConfig]   (immutable, built at startup)
//!   ├── publish(samples)              ← once per probe iteration
//!   │   └── PushTransport::post() per endpoint, concurrently
//!   └── per-endpoint failures are logged, never returned
//! ```

pub mod sample;
pub mod sink;

pub use sample::{Labels, MetricName, MetricSample, SampleError, render_payload};
pub use sink::{EndpointConfig, HttpPushTransport, MetricsSink, PushError, PushTransport};
