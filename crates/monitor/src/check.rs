//! Results of checks and sweeps.

use artguard_core::{
    AlertEvent, ArtifactId, DetectionReport, FindingDiff, RepairResult, Time, ValidationReport,
};
use serde::{Deserialize, Serialize};

/// Everything one completed check produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    /// The checked artifact
    pub id: ArtifactId,

    /// When the findings were committed
    pub checked_at: Time,

    /// New, resolved and unchanged findings
    pub diff: FindingDiff,

    /// Detector output
    pub detection: DetectionReport,

    /// Validator output
    pub validation: ValidationReport,

    /// Automatic repair, when it ran
    pub repair: Option<RepairResult>,

    /// Alert raised by this check
    pub alert: Option<AlertEvent>,

    /// Whether a deferred re-check was scheduled
    pub recheck_scheduled: bool,
}

/// Outcome of a check request for a registered artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Another check of the same artifact was running
    Skipped,
    /// The check ran
    Completed(Box<CheckReport>),
}

impl CheckOutcome {
    /// The report, if the check ran.
    pub fn report(&self) -> Option<&CheckReport> {
        match self {
            CheckOutcome::Completed(report) => Some(report),
            CheckOutcome::Skipped => None,
        }
    }

    /// Whether the check was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, CheckOutcome::Skipped)
    }
}

/// Counters of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Checks that completed
    pub checked: usize,

    /// Artifacts skipped because they were busy
    pub skipped: usize,

    /// Checks that failed and were isolated
    pub failed: usize,
}

impl SweepSummary {
    /// Artifacts the sweep looked at.
    pub fn total(&self) -> usize {
        self.checked + self.skipped + self.failed
    }
}
