//! Metric samples recorded per generation or check.

use serde::{Deserialize, Serialize};

use crate::finding::Category;
use crate::Time;

/// One recorded outcome. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Completion time
    pub timestamp: Time,

    /// Time between start and completion
    pub duration_ms: u64,

    /// Whether the run produced a usable artifact
    pub success: bool,

    /// Derived 0-100 quality figure
    pub quality_score: f64,

    /// Content type tag
    pub type_tag: String,

    /// Findings left at completion
    pub finding_count: usize,

    /// Fixes applied
    pub fix_count: usize,

    /// Categories of the findings seen
    #[serde(default)]
    pub categories: Vec<Category>,
}
