//! Artifact model - a unit of generated text under continuous watch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::finding::{Finding, SeverityCounts};
use crate::id::ArtifactId;
use crate::report::ValidationReport;
use crate::Time;

/// Number of history entries kept per artifact.
pub const HISTORY_CAPACITY: usize = 50;

/// Opaque caller-supplied key/value data.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A registered artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Caller-assigned identifier
    pub id: ArtifactId,

    /// Current, possibly repaired, content
    pub text: String,

    /// Content type tag supplied by the generator
    pub type_tag: String,

    /// Opaque metadata
    pub metadata: Metadata,

    /// When it was registered
    pub registered_at: Time,

    /// When it was last checked
    pub last_checked_at: Option<Time>,

    /// Findings of the latest check, replaced wholesale each check
    pub current_findings: Vec<Finding>,

    /// Bounded check history, oldest first
    pub history: VecDeque<HistoryEntry>,

    /// Repair automatically after a check
    pub auto_fix_enabled: bool,

    /// Raise threshold alerts for new findings
    pub alerts_enabled: bool,

    /// Latest validation verdict
    pub last_validation: Option<ValidationSummary>,
}

impl Artifact {
    /// Create a newly registered artifact.
    pub fn new(
        id: ArtifactId,
        text: impl Into<String>,
        type_tag: impl Into<String>,
        metadata: Metadata,
        registered_at: Time,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            type_tag: type_tag.into(),
            metadata,
            registered_at,
            last_checked_at: None,
            current_findings: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            auto_fix_enabled: false,
            alerts_enabled: true,
            last_validation: None,
        }
    }

    /// Set the per-artifact switches.
    pub fn with_settings(mut self, auto_fix_enabled: bool, alerts_enabled: bool) -> Self {
        self.auto_fix_enabled = auto_fix_enabled;
        self.alerts_enabled = alerts_enabled;
        self
    }

    /// Replace the current findings with the result of a check and append a
    /// history entry. Returns the diff against the previous findings.
    pub fn record_check(&mut self, findings: Vec<Finding>, checked_at: Time) -> FindingDiff {
        let diff = FindingDiff::between(&self.current_findings, &findings);

        self.history.push_back(HistoryEntry::from_findings(checked_at, &findings));
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        self.current_findings = findings;
        self.last_checked_at = Some(checked_at);
        diff
    }

    /// Apply a partial settings update.
    pub fn apply_settings(&mut self, update: &ArtifactSettingsUpdate) {
        if let Some(auto_fix) = update.auto_fix_enabled {
            self.auto_fix_enabled = auto_fix;
        }
        if let Some(alerts) = update.alerts_enabled {
            self.alerts_enabled = alerts;
        }
    }

    /// Read-only snapshot for status queries.
    pub fn status(&self, busy: bool) -> ArtifactStatus {
        ArtifactStatus {
            id: self.id.clone(),
            type_tag: self.type_tag.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            registered_at: self.registered_at,
            last_checked_at: self.last_checked_at,
            severity_counts: SeverityCounts::from_findings(&self.current_findings),
            current_findings: self.current_findings.clone(),
            history: self.history.iter().cloned().collect(),
            auto_fix_enabled: self.auto_fix_enabled,
            alerts_enabled: self.alerts_enabled,
            last_validation: self.last_validation.clone(),
            busy,
        }
    }
}

/// One bounded history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the check ran
    pub timestamp: Time,

    /// Number of findings
    pub finding_count: usize,

    /// Severity breakdown
    pub severity_counts: SeverityCounts,

    /// Finding kinds present, sorted
    pub kinds: Vec<String>,
}

impl HistoryEntry {
    fn from_findings(timestamp: Time, findings: &[Finding]) -> Self {
        let mut kinds: Vec<String> = findings.iter().map(|f| f.kind.clone()).collect();
        kinds.sort();
        kinds.dedup();
        Self {
            timestamp,
            finding_count: findings.len(),
            severity_counts: SeverityCounts::from_findings(findings),
            kinds,
        }
    }
}

/// Condensed validation verdict kept on the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub overall_score: f64,
    pub is_valid: bool,
}

impl From<&ValidationReport> for ValidationSummary {
    fn from(report: &ValidationReport) -> Self {
        Self {
            overall_score: report.overall_score,
            is_valid: report.is_valid,
        }
    }
}

/// Difference between two consecutive finding sets, keyed by `(kind, message)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingDiff {
    /// Present now, absent before
    pub new_findings: Vec<Finding>,

    /// Present before, absent now
    pub resolved_findings: Vec<Finding>,

    /// Present in both
    pub unchanged_findings: Vec<Finding>,
}

impl FindingDiff {
    /// Diff `previous` against `current`.
    pub fn between(previous: &[Finding], current: &[Finding]) -> Self {
        let previous_keys: HashSet<_> = previous.iter().map(Finding::key).collect();
        let current_keys: HashSet<_> = current.iter().map(Finding::key).collect();

        let (unchanged_findings, new_findings): (Vec<Finding>, Vec<Finding>) = current
            .iter()
            .cloned()
            .partition(|f| previous_keys.contains(&f.key()));
        let resolved_findings = previous
            .iter()
            .filter(|f| !current_keys.contains(&f.key()))
            .cloned()
            .collect();

        Self {
            new_findings,
            resolved_findings,
            unchanged_findings,
        }
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.new_findings.is_empty() && self.resolved_findings.is_empty()
    }
}

/// Partial update of the per-artifact switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSettingsUpdate {
    pub auto_fix_enabled: Option<bool>,
    pub alerts_enabled: Option<bool>,
}

/// Read-only view of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStatus {
    pub id: ArtifactId,
    pub type_tag: String,
    /// Latest committed text
    pub text: String,
    pub metadata: Metadata,
    pub registered_at: Time,
    pub last_checked_at: Option<Time>,
    pub severity_counts: SeverityCounts,
    pub current_findings: Vec<Finding>,
    pub history: Vec<HistoryEntry>,
    pub auto_fix_enabled: bool,
    pub alerts_enabled: bool,
    pub last_validation: Option<ValidationSummary>,
    /// Whether a check is running right now
    pub busy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Category, Severity};
    use chrono::Utc;

    fn finding(kind: &str) -> Finding {
        Finding::new(kind, Severity::Medium, Category::Performance, format!("{} found", kind))
    }

    fn artifact() -> Artifact {
        Artifact::new(ArtifactId::new("a"), "<html></html>", "game", Metadata::new(), Utc::now())
    }

    #[test]
    fn test_diff_partitions_findings() {
        let before = vec![finding("a"), finding("b")];
        let after = vec![finding("b"), finding("c")];
        let diff = FindingDiff::between(&before, &after);

        assert_eq!(diff.new_findings, vec![finding("c")]);
        assert_eq!(diff.resolved_findings, vec![finding("a")]);
        assert_eq!(diff.unchanged_findings, vec![finding("b")]);

        let new_keys: HashSet<_> = diff.new_findings.iter().map(Finding::key).collect();
        assert!(diff.resolved_findings.iter().all(|f| !new_keys.contains(&f.key())));
    }

    #[test]
    fn test_diff_new_plus_unchanged_is_current() {
        let before = vec![finding("x"), finding("y")];
        let after = vec![finding("y"), finding("z"), finding("w")];
        let diff = FindingDiff::between(&before, &after);

        let mut union: Vec<_> = diff
            .new_findings
            .iter()
            .chain(diff.unchanged_findings.iter())
            .map(Finding::key)
            .collect();
        let mut current: Vec<_> = after.iter().map(Finding::key).collect();
        union.sort();
        current.sort();
        assert_eq!(union, current);
    }

    #[test]
    fn test_diff_ignores_location_changes() {
        let mut moved = finding("a");
        moved.location = Some(crate::finding::Location::line(12));
        let diff = FindingDiff::between(&[finding("a")], &[moved]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_record_check_updates_state() {
        let mut artifact = artifact();
        let now = Utc::now();
        let diff = artifact.record_check(vec![finding("a")], now);
        assert_eq!(diff.new_findings.len(), 1);
        assert_eq!(artifact.last_checked_at, Some(now));
        assert_eq!(artifact.current_findings.len(), 1);
        assert_eq!(artifact.history.len(), 1);
        assert_eq!(artifact.history[0].kinds, vec!["a".to_string()]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut artifact = artifact();
        for _ in 0..(HISTORY_CAPACITY + 7) {
            artifact.record_check(vec![], Utc::now());
        }
        assert_eq!(artifact.history.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_apply_partial_settings() {
        let mut artifact = artifact().with_settings(false, true);
        artifact.apply_settings(&ArtifactSettingsUpdate {
            auto_fix_enabled: Some(true),
            alerts_enabled: None,
        });
        assert!(artifact.auto_fix_enabled);
        assert!(artifact.alerts_enabled);
    }

    #[test]
    fn test_status_snapshot() {
        let mut artifact = artifact();
        artifact.record_check(vec![finding("a"), finding("b")], Utc::now());
        let status = artifact.status(true);
        assert!(status.busy);
        assert_eq!(status.severity_counts.medium, 2);
        assert_eq!(status.history.len(), 1);
    }
}
