//! Sample naming for one probe outcome.

use chainprobe_metrics::{Labels, MetricName, MetricSample, SampleError};

use crate::latency::LatencyBreakdown;

/// Metric names and label set of one probe.
///
/// Given base name `B`: `B` is the total latency, `B_<phase>` one latency
/// per measured phase and `B_success` is 1 or 0.
#[derive(Debug, Clone)]
pub struct ProbeMetrics {
    latency: MetricName,
    success: MetricName,
    labels: Labels,
}

impl ProbeMetrics {
    pub fn new(base: MetricName, labels: Labels) -> Result<Self, SampleError> {
        let success = base.with_suffix("success")?;
        Ok(Self {
            latency: base,
            success,
            labels,
        })
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn success_name(&self) -> &MetricName {
        &self.success
    }

    /// Phase latencies, then the total, then `B_success 1`.
    pub fn success_samples(
        &self,
        breakdown: &LatencyBreakdown,
    ) -> Result<Vec<MetricSample>, SampleError> {
        let mut samples = Vec::with_capacity(breakdown.phases.len() + 2);
        for phase in &breakdown.phases {
            samples.push(self.sample(self.latency.with_suffix(phase.phase)?, phase.seconds));
        }
        samples.push(self.sample(self.latency.clone(), breakdown.total));
        samples.push(self.sample(self.success.clone(), 1.0));
        Ok(samples)
    }

    /// Only `B_success 0`; a failed iteration has no latency.
    pub fn failure_samples(&self) -> Vec<MetricSample> {
        vec![self.sample(self.success.clone(), 0.0)]
    }

    fn sample(&self, name: MetricName, value: f64) -> MetricSample {
        MetricSample::new(name, self.labels.clone(), value)
    }
}
