//! Phase and end-to-end latency derived from a phase timeline.

use std::fmt;

use chainprobe_chain::PhaseTimeline;

/// Elapsed seconds of one phase, named after the mark that closes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseLatency {
    pub phase: &'static str,
    pub seconds: f64,
}

/// Latencies of one successful iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyBreakdown {
    pub phases: Vec<PhaseLatency>,
    /// First to last mark of the measured window.
    pub total: f64,
}

impl LatencyBreakdown {
    /// `None` when the timeline has fewer than two marks, since no
    /// interval was measured.
    pub fn from_timeline(timeline: &PhaseTimeline) -> Option<Self> {
        let marks = timeline.marks();
        let (first, last) = (marks.first()?, marks.last()?);
        if marks.len() < 2 {
            return None;
        }

        let phases = marks
            .windows(2)
            .map(|pair| PhaseLatency {
                phase: pair[1].name,
                seconds: pair[1].at.saturating_duration_since(pair[0].at).as_secs_f64(),
            })
            .collect();
        Some(Self {
            phases,
            total: last.at.saturating_duration_since(first.at).as_secs_f64(),
        })
    }
}

impl fmt::Display for LatencyBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for phase in &self.phases {
            write!(f, "{}={:.3}s ", phase.phase, phase.seconds)?;
        }
        write!(f, "total={:.3}s", self.total)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chainprobe_chain::phase;
    use tokio::time::Instant;

    use super::*;

    fn timeline(offsets_ms: &[(&'static str, u64)]) -> PhaseTimeline {
        let base = Instant::now();
        let mut timeline = PhaseTimeline::new();
        for &(name, ms) in offsets_ms {
            timeline.mark_at(name, base + Duration::from_millis(ms));
        }
        timeline
    }

    #[test]
    fn consecutive_differences_and_total() {
        let breakdown = LatencyBreakdown::from_timeline(&timeline(&[
            (phase::START, 0),
            (phase::BUILD, 10),
            (phase::SUBMIT, 40),
            (phase::CONFIRM, 90),
        ]))
        .unwrap();

        let phases: Vec<_> = breakdown.phases.iter().map(|p| (p.phase, p.seconds)).collect();
        assert_eq!(
            phases,
            vec![("build", 0.01), ("submit", 0.03), ("confirm", 0.05)]
        );
        assert_eq!(breakdown.total, 0.09);
        assert_eq!(
            breakdown.to_string(),
            "build=0.010s submit=0.030s confirm=0.050s total=0.090s"
        );
    }

    #[test]
    fn skipped_phase_is_absent_not_zero() {
        let breakdown = LatencyBreakdown::from_timeline(&timeline(&[
            (phase::START, 0),
            (phase::SUBMIT, 25),
            (phase::CONFIRM, 125),
        ]))
        .unwrap();
        let names: Vec<_> = breakdown.phases.iter().map(|p| p.phase).collect();
        assert_eq!(names, vec!["submit", "confirm"]);
    }

    #[test]
    fn total_covers_every_phase() {
        let breakdown = LatencyBreakdown::from_timeline(&timeline(&[
            (phase::START, 0),
            (phase::BUILD, 3),
            (phase::SUBMIT, 3),
            (phase::CONFIRM, 1_500),
        ]))
        .unwrap();
        let sum: f64 = breakdown.phases.iter().map(|p| p.seconds).sum();
        assert!(breakdown.phases.iter().all(|p| p.seconds >= 0.0));
        assert!((breakdown.total - sum).abs() < 1e-9);
        for phase in &breakdown.phases {
            assert!(breakdown.total >= phase.seconds);
        }
    }

    #[test]
    fn out_of_order_marks_clamp_to_zero() {
        let breakdown = LatencyBreakdown::from_timeline(&timeline(&[
            (phase::START, 50),
            (phase::SUBMIT, 20),
        ]))
        .unwrap();
        assert_eq!(breakdown.phases[0].seconds, 0.0);
        assert_eq!(breakdown.total, 0.0);
    }

    #[test]
    fn single_mark_has_no_breakdown() {
        assert!(LatencyBreakdown::from_timeline(&PhaseTimeline::start()).is_none());
        assert!(LatencyBreakdown::from_timeline(&PhaseTimeline::new()).is_none());
    }
}
