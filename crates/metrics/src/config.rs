//! Aggregator settings.

use serde::{Deserialize, Serialize};

/// Metrics aggregator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Samples kept in the rolling log
    pub max_samples: usize,

    /// Samples per side of a trend comparison
    pub trend_window: usize,

    /// Success rate below which a warning is raised
    pub success_rate_warning: f64,

    /// Success rate below which the situation is critical
    pub success_rate_critical: f64,

    /// Average duration above which a warning is raised
    pub duration_warning_ms: f64,

    /// Average duration above which the situation is critical
    pub duration_critical_ms: f64,

    /// Average quality below which a warning is raised
    pub quality_warning: f64,

    /// Average quality below which the situation is critical
    pub quality_critical: f64,

    /// Attempts before a transformation's success rate is judged
    pub min_fix_attempts: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            trend_window: 50,
            success_rate_warning: 0.90,
            success_rate_critical: 0.75,
            duration_warning_ms: 5_000.0,
            duration_critical_ms: 15_000.0,
            quality_warning: 70.0,
            quality_critical: 50.0,
            min_fix_attempts: 5,
        }
    }
}

impl MetricsConfig {
    /// Set the rolling log size.
    pub fn with_max_samples(mut self, max: usize) -> Self {
        self.max_samples = max.max(1);
        self
    }

    /// Set the trend window size.
    pub fn with_trend_window(mut self, n: usize) -> Self {
        self.trend_window = n.max(1);
        self
    }

    /// Set the fix attempt threshold.
    pub fn with_min_fix_attempts(mut self, n: u32) -> Self {
        self.min_fix_attempts = n;
        self
    }
}
