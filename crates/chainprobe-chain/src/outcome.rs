//! Phase timestamps and the per-iteration outcome.

use tokio::time::Instant;

use crate::error::ProbeError;

/// Phase boundary names shared by all adapters.
///
/// A timestamp names the phase it closes; the first one opens the
/// measured window.
pub mod phase {
    pub const START: &str = "start";
    pub const BUILD: &str = "build";
    pub const SUBMIT: &str = "submit";
    pub const CONFIRM: &str = "confirm";
}

/// A named instant inside one probe iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimestamp {
    pub name: &'static str,
    pub at: Instant,
}

/// Ordered timestamps of the measured window of one iteration.
///
/// Preliminary reads (sequence numbers, nonces, object versions) happen
/// before the first mark and are not part of the window. Chains without
/// an explicit phase simply never mark it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseTimeline {
    marks: Vec<PhaseTimestamp>,
}

impl PhaseTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a timeline with a `start` mark at the current instant.
    pub fn start() -> Self {
        let mut timeline = Self::new();
        timeline.mark(phase::START);
        timeline
    }

    /// Record `name` at the current instant.
    pub fn mark(&mut self, name: &'static str) {
        self.mark_at(name, Instant::now());
    }

    /// Record `name` at an explicit instant.
    pub fn mark_at(&mut self, name: &'static str, at: Instant) {
        self.marks.push(PhaseTimestamp { name, at });
    }

    pub fn marks(&self) -> &[PhaseTimestamp] {
        &self.marks
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn first(&self) -> Option<&PhaseTimestamp> {
        self.marks.first()
    }

    pub fn last(&self) -> Option<&PhaseTimestamp> {
        self.marks.last()
    }
}

/// Result of one probe iteration. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success {
        timeline: PhaseTimeline,
    },
    Failure {
        /// Error class, as in [`ProbeError::kind`].
        kind: &'static str,
        error: String,
    },
}

impl ProbeOutcome {
    pub fn failure(kind: &'static str, error: impl Into<String>) -> Self {
        ProbeOutcome::Failure {
            kind,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

impl From<Result<PhaseTimeline, ProbeError>> for ProbeOutcome {
    fn from(result: Result<PhaseTimeline, ProbeError>) -> Self {
        match result {
            Ok(timeline) => ProbeOutcome::Success { timeline },
            Err(e) => ProbeOutcome::failure(e.kind(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeline_keeps_mark_order() {
        let base = Instant::now();
        let mut timeline = PhaseTimeline::new();
        timeline.mark_at(phase::START, base);
        timeline.mark_at(phase::SUBMIT, base + Duration::from_millis(5));
        timeline.mark_at(phase::CONFIRM, base + Duration::from_millis(9));

        let names: Vec<_> = timeline.marks().iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["start", "submit", "confirm"]);
        assert_eq!(timeline.first().unwrap().at, base);
        assert_eq!(timeline.last().unwrap().name, "confirm");
    }

    #[test]
    fn start_opens_window() {
        let timeline = PhaseTimeline::start();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.first().unwrap().name, phase::START);
    }

    #[test]
    fn outcome_from_result() {
        let ok: ProbeOutcome = Ok(PhaseTimeline::start()).into();
        assert!(ok.is_success());

        let failed: ProbeOutcome = Err(ProbeError::Rejected("EINSUFFICIENT_BALANCE".into())).into();
        assert_eq!(
            failed,
            ProbeOutcome::failure("rejected", "transaction rejected: EINSUFFICIENT_BALANCE")
        );
    }
}
