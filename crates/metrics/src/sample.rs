//! Inputs of a recorded run and the statistics derived from samples.

use artguard_core::{Category, DetectionReport, MetricSample, RepairResult, ValidationReport};
use serde::{Deserialize, Serialize};

/// What is being measured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRequest {
    /// Content type tag
    pub type_tag: String,

    /// Artifact or job label, for logs
    pub label: Option<String>,
}

impl MetricRequest {
    /// Request for a content type.
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            label: None,
        }
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// How a measured run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOutcome {
    /// Whether a usable artifact came out
    pub success: bool,

    /// Size of the final text in bytes
    pub text_len: usize,

    /// Findings left at the end
    pub remaining_findings: usize,

    /// Fixes applied
    pub fix_count: usize,

    /// Validator verdict, when validation ran
    pub is_valid: Option<bool>,

    /// Categories of the findings seen
    pub categories: Vec<Category>,
}

impl MetricOutcome {
    /// A run that produced `text_len` bytes.
    pub fn success(text_len: usize) -> Self {
        Self {
            success: true,
            text_len,
            remaining_findings: 0,
            fix_count: 0,
            is_valid: None,
            categories: Vec::new(),
        }
    }

    /// A run that produced nothing usable.
    pub fn failure() -> Self {
        Self {
            success: false,
            ..Self::success(0)
        }
    }

    /// Set the remaining finding count.
    pub fn with_remaining(mut self, n: usize) -> Self {
        self.remaining_findings = n;
        self
    }

    /// Set the applied fix count.
    pub fn with_fixes(mut self, n: usize) -> Self {
        self.fix_count = n;
        self
    }

    /// Set the validator verdict.
    pub fn with_validity(mut self, valid: bool) -> Self {
        self.is_valid = Some(valid);
        self
    }

    /// Set the finding categories.
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    /// Outcome of a check: detection, optional validation and optional repair.
    ///
    /// When a repair ran, its remaining findings replace the detected ones.
    pub fn from_check(
        text: &str,
        detection: &DetectionReport,
        validation: Option<&ValidationReport>,
        repair: Option<&RepairResult>,
    ) -> Self {
        let (text_len, remaining, fixes) = match repair {
            Some(r) => (r.fixed_text.len(), r.remaining_findings.len(), r.applied_fixes.len()),
            None => (text.len(), detection.findings.len(), 0),
        };
        let mut categories: Vec<Category> = detection.findings.iter().map(|f| f.category).collect();
        categories.sort();
        categories.dedup();

        let mut outcome = Self::success(text_len)
            .with_remaining(remaining)
            .with_fixes(fixes)
            .with_categories(categories);
        if let Some(v) = validation {
            outcome = outcome.with_validity(v.is_valid);
        }
        outcome
    }

    /// Derived 0-100 quality figure.
    ///
    /// 40 for a successful run, up to 20 by size (one per 1000 bytes), 20 for
    /// no remaining findings (10 for up to 3, 5 for up to 5), 10 when a fix
    /// was applied and 10 for a valid verdict.
    pub fn quality_score(&self) -> f64 {
        if !self.success {
            return 0.0;
        }
        let size = (self.text_len / 1000).min(20) as f64;
        let findings = match self.remaining_findings {
            0 => 20.0,
            1..=3 => 10.0,
            4..=5 => 5.0,
            _ => 0.0,
        };
        let fixes = if self.fix_count > 0 { 10.0 } else { 0.0 };
        let valid = if self.is_valid == Some(true) { 10.0 } else { 0.0 };
        (40.0 + size + findings + fixes + valid).clamp(0.0, 100.0)
    }
}

/// Aggregate over a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowStats {
    /// Samples in the window
    pub count: usize,

    /// Share of successful samples, 0 when empty
    pub success_rate: f64,

    /// Mean duration, 0 when empty
    pub avg_duration_ms: f64,

    /// Mean quality score, 0 when empty
    pub avg_quality: f64,
}

impl WindowStats {
    /// Compute over samples.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a MetricSample>) -> Self {
        let mut stats = Self::default();
        let mut successes = 0usize;
        let mut duration = 0f64;
        let mut quality = 0f64;
        for s in samples {
            stats.count += 1;
            successes += usize::from(s.success);
            duration += s.duration_ms as f64;
            quality += s.quality_score;
        }
        if stats.count > 0 {
            let n = stats.count as f64;
            stats.success_rate = successes as f64 / n;
            stats.avg_duration_ms = duration / n;
            stats.avg_quality = quality / n;
        }
        stats
    }

    /// Whether the window has no samples.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
