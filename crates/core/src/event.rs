//! Monitoring events - one tagged variant per observable occurrence.

use serde::{Deserialize, Serialize};

use crate::finding::{Finding, SeverityCounts};
use crate::id::{AlertId, ArtifactId};
use crate::report::RepairResult;
use crate::Time;

/// Alert raised when new findings meet the configured thresholds.
///
/// Alerts are emitted, never stored on the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique identifier
    pub id: AlertId,

    /// The artifact that triggered it
    pub artifact_id: ArtifactId,

    /// Severity breakdown of the new findings
    pub severity_counts: SeverityCounts,

    /// Which thresholds were met, e.g. `critical: 1`
    pub triggering_reasons: Vec<String>,

    /// When it was raised
    pub timestamp: Time,
}

impl AlertEvent {
    /// Create a new alert.
    pub fn new(
        artifact_id: ArtifactId,
        severity_counts: SeverityCounts,
        triggering_reasons: Vec<String>,
        timestamp: Time,
    ) -> Self {
        Self {
            id: AlertId::new(),
            artifact_id,
            severity_counts,
            triggering_reasons,
            timestamp,
        }
    }
}

/// Event published by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// The sweep timer was started.
    MonitoringStarted { at: Time },

    /// The sweep timer was stopped.
    MonitoringStopped { at: Time },

    /// An artifact was put under watch.
    ArtifactRegistered { id: ArtifactId },

    /// An artifact was removed from watch.
    ArtifactUnregistered { id: ArtifactId },

    /// A check found findings that were not present before.
    NewErrorsDetected { id: ArtifactId, new_findings: Vec<Finding> },

    /// A check found new critical findings.
    CriticalErrorsDetected { id: ArtifactId, findings: Vec<Finding> },

    /// Automatic repair changed the artifact text.
    AutoFixCompleted { id: ArtifactId, result: Box<RepairResult> },

    /// Automatic repair applied nothing.
    AutoFixFailed { id: ArtifactId, reason: String },

    /// New findings met the alert thresholds.
    AlertTriggered(AlertEvent),
}

impl MonitorEvent {
    /// Discriminant used for subscription filtering.
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::MonitoringStarted { .. } => EventKind::MonitoringStarted,
            MonitorEvent::MonitoringStopped { .. } => EventKind::MonitoringStopped,
            MonitorEvent::ArtifactRegistered { .. } => EventKind::ArtifactRegistered,
            MonitorEvent::ArtifactUnregistered { .. } => EventKind::ArtifactUnregistered,
            MonitorEvent::NewErrorsDetected { .. } => EventKind::NewErrorsDetected,
            MonitorEvent::CriticalErrorsDetected { .. } => EventKind::CriticalErrorsDetected,
            MonitorEvent::AutoFixCompleted { .. } => EventKind::AutoFixCompleted,
            MonitorEvent::AutoFixFailed { .. } => EventKind::AutoFixFailed,
            MonitorEvent::AlertTriggered(_) => EventKind::AlertTriggered,
        }
    }

    /// The artifact the event concerns, if any.
    pub fn artifact_id(&self) -> Option<&ArtifactId> {
        match self {
            MonitorEvent::MonitoringStarted { .. } | MonitorEvent::MonitoringStopped { .. } => None,
            MonitorEvent::ArtifactRegistered { id }
            | MonitorEvent::ArtifactUnregistered { id }
            | MonitorEvent::NewErrorsDetected { id, .. }
            | MonitorEvent::CriticalErrorsDetected { id, .. }
            | MonitorEvent::AutoFixCompleted { id, .. }
            | MonitorEvent::AutoFixFailed { id, .. } => Some(id),
            MonitorEvent::AlertTriggered(alert) => Some(&alert.artifact_id),
        }
    }
}

/// Names of the monitor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    MonitoringStarted,
    MonitoringStopped,
    ArtifactRegistered,
    ArtifactUnregistered,
    NewErrorsDetected,
    CriticalErrorsDetected,
    AutoFixCompleted,
    AutoFixFailed,
    AlertTriggered,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 9] = [
        EventKind::MonitoringStarted,
        EventKind::MonitoringStopped,
        EventKind::ArtifactRegistered,
        EventKind::ArtifactUnregistered,
        EventKind::NewErrorsDetected,
        EventKind::CriticalErrorsDetected,
        EventKind::AutoFixCompleted,
        EventKind::AutoFixFailed,
        EventKind::AlertTriggered,
    ];

    /// Event name as used by subscribers.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MonitoringStarted => "monitoringStarted",
            EventKind::MonitoringStopped => "monitoringStopped",
            EventKind::ArtifactRegistered => "artifactRegistered",
            EventKind::ArtifactUnregistered => "artifactUnregistered",
            EventKind::NewErrorsDetected => "newErrorsDetected",
            EventKind::CriticalErrorsDetected => "criticalErrorsDetected",
            EventKind::AutoFixCompleted => "autoFixCompleted",
            EventKind::AutoFixFailed => "autoFixFailed",
            EventKind::AlertTriggered => "alertTriggered",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event '{}'", s))
    }
}
