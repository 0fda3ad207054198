//! ArtGuard core data models.
//!
//! This crate defines the value types shared by the validation, detection,
//! repair, monitoring and metrics crates: findings and their severities, the
//! reports each pass produces, the monitored artifact, monitor events, and the
//! text model the checks run over.

#![warn(missing_docs)]

// Identities
mod id;

// Findings and reports
mod finding;
mod report;

// Monitored state
mod artifact;
mod event;
mod metric;

// Analysis support
mod contract;
mod text;
mod clock;
mod error;

// Re-exports
pub use id::*;

pub use finding::{
    count_by_category, dedup_findings, sort_by_severity, Category, Finding, FindingKey, Location,
    Severity, SeverityCounts, ANALYSIS_ERROR_KIND,
};
pub use report::{
    CategoryReport, DetectionConfidence, DetectionReport, RepairAttempt, RepairFailure,
    RepairResult, ValidationReport,
};

pub use artifact::{
    Artifact, ArtifactSettingsUpdate, ArtifactStatus, FindingDiff, HistoryEntry, Metadata,
    ValidationSummary, HISTORY_CAPACITY,
};
pub use event::{AlertEvent, EventKind, MonitorEvent};
pub use metric::MetricSample;

pub use contract::{CompiledContract, FrameworkContract};
pub use text::{contains_word, ArtifactText, Balance, ScriptBlock, UNBOUNDED_LOOP_PATTERN};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{compile_pattern, GuardError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
