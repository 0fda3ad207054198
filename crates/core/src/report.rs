//! Reports produced by the validation, detection and repair passes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::finding::{sort_by_severity, Category, Finding, Severity, SeverityCounts};

/// Scored result of one rule category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Score between 0 and 100
    pub score: f64,

    /// Findings produced by the category
    pub findings: Vec<Finding>,

    /// Whether any finding in the category is critical
    pub critical: bool,
}

impl CategoryReport {
    /// Build a category report from its findings and an already computed score.
    pub fn new(score: f64, findings: Vec<Finding>) -> Self {
        let critical = findings.iter().any(Finding::is_critical);
        Self {
            score: score.clamp(0.0, 100.0),
            findings,
            critical,
        }
    }
}

/// Per-category scored summary with an aggregate verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Category results
    pub categories: BTreeMap<Category, CategoryReport>,

    /// Mean of the category scores
    pub overall_score: f64,

    /// `overall_score >= minimum` and no critical category
    pub is_valid: bool,

    /// Every finding, most severe first
    pub suggestions: Vec<Finding>,
}

impl ValidationReport {
    /// Combine category reports into a verdict.
    ///
    /// A single critical category always fails the report, whatever the
    /// average says.
    pub fn assemble(categories: BTreeMap<Category, CategoryReport>, min_overall_score: f64) -> Self {
        let overall_score = if categories.is_empty() {
            100.0
        } else {
            categories.values().map(|c| c.score).sum::<f64>() / categories.len() as f64
        };
        let any_critical = categories.values().any(|c| c.critical);

        let mut suggestions: Vec<Finding> = categories
            .values()
            .flat_map(|c| c.findings.iter().cloned())
            .collect();
        sort_by_severity(&mut suggestions);

        Self {
            categories,
            overall_score,
            is_valid: overall_score >= min_overall_score && !any_critical,
            suggestions,
        }
    }

    /// Whether any category carries a critical finding.
    pub fn has_critical(&self) -> bool {
        self.categories.values().any(|c| c.critical)
    }

    /// Total number of findings across categories.
    pub fn finding_count(&self) -> usize {
        self.suggestions.len()
    }
}

/// How much of the detection pipeline produced the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DetectionConfidence {
    /// Pattern pass and sandbox trial both ran
    Full,
    /// Only the pattern pass ran
    PatternOnly { reason: String },
}

impl DetectionConfidence {
    /// Whether the sandbox pass contributed.
    pub fn is_full(&self) -> bool {
        matches!(self, DetectionConfidence::Full)
    }
}

/// Output of the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Deduplicated findings
    pub findings: Vec<Finding>,

    /// Single roll-up level
    pub severity_level: Severity,

    /// Finding count per category
    pub categories: BTreeMap<Category, usize>,

    /// Actionable recommendations, most urgent first
    pub recommendations: Vec<String>,

    /// Whether the sandbox pass contributed
    pub confidence: DetectionConfidence,
}

impl DetectionReport {
    /// Per-severity counts of the findings.
    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts::from_findings(&self.findings)
    }

    /// Whether nothing was found.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Why a repair attempt did not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RepairFailure {
    /// No transformation is registered for the finding kind
    #[error("no transformation registered for '{kind}'")]
    NoTransformation { kind: String },

    /// The transformation left the text unchanged
    #[error("transformation produced no change")]
    NoChange,

    /// The transformation introduced new findings and was reverted
    #[error("transformation introduced new findings: {}", .kinds.join(", "))]
    IntroducedRegression { kinds: Vec<String> },

    /// An earlier transformation in the same run already handled it
    #[error("already resolved by '{by}' earlier in this run")]
    AlreadyResolved { by: String },
}

/// One attempt to fix one finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAttempt {
    /// The finding being fixed
    pub finding: Finding,

    /// Transformation looked up for the finding
    pub transformation_id: Option<String>,

    /// Whether the text was changed
    pub applied: bool,

    /// Failure reason when not applied
    pub reason: Option<RepairFailure>,
}

impl RepairAttempt {
    /// Successful attempt.
    pub fn applied(finding: Finding, transformation_id: impl Into<String>) -> Self {
        Self {
            finding,
            transformation_id: Some(transformation_id.into()),
            applied: true,
            reason: None,
        }
    }

    /// Failed attempt.
    pub fn failed(finding: Finding, transformation_id: Option<String>, reason: RepairFailure) -> Self {
        Self {
            finding,
            transformation_id,
            applied: false,
            reason: Some(reason),
        }
    }
}

/// Aggregate of one repair run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResult {
    /// Text after all applied transformations
    pub fixed_text: String,

    /// Attempts that changed the text
    pub applied_fixes: Vec<RepairAttempt>,

    /// Attempts that did not
    pub failed_fixes: Vec<RepairAttempt>,

    /// Findings detected on the fixed text
    pub remaining_findings: Vec<Finding>,

    /// Percentage of findings that went away, never negative
    pub improvement_rate: f64,
}

impl RepairResult {
    /// `(original - remaining) / original * 100`, 100 for an empty input,
    /// floored at 0.
    pub fn compute_improvement_rate(original: usize, remaining: usize) -> f64 {
        if original == 0 {
            return 100.0;
        }
        let resolved = original.saturating_sub(remaining);
        resolved as f64 / original as f64 * 100.0
    }

    /// Whether any fix changed the text.
    pub fn changed(&self) -> bool {
        !self.applied_fixes.is_empty()
    }
}
