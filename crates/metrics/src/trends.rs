//! Trend classification and recommendations.

use artguard_core::{Category, MetricSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MetricsConfig;
use crate::learning::FixLedger;
use crate::sample::WindowStats;

/// Direction of a metric between two adjacent windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Getting better
    Improving,
    /// Getting worse
    Declining,
    /// No change, or nothing to compare against
    Stable,
}

/// One metric compared across two windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// Value over the most recent window
    pub current: f64,

    /// Value over the window before it
    pub previous: f64,

    /// `current - previous`
    pub delta: f64,

    /// Classification of the delta
    pub direction: TrendDirection,
}

impl Trend {
    /// Compare two values. `higher_is_better` decides the sign convention;
    /// without a previous window the trend is stable.
    pub fn compare(current: f64, previous: Option<f64>, higher_is_better: bool) -> Self {
        let Some(previous) = previous else {
            return Self {
                current,
                previous: current,
                delta: 0.0,
                direction: TrendDirection::Stable,
            };
        };
        let delta = current - previous;
        let direction = if delta.abs() < f64::EPSILON {
            TrendDirection::Stable
        } else if (delta > 0.0) == higher_is_better {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        };
        Self {
            current,
            previous,
            delta,
            direction,
        }
    }
}

/// Trends of the headline metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// Samples per compared window
    pub window: usize,

    /// Success rate trend
    pub success_rate: Trend,

    /// Duration trend; shorter is better
    pub avg_duration_ms: Trend,

    /// Quality trend
    pub avg_quality: Trend,
}

impl TrendReport {
    /// Compare the last `n` samples with the `n` before them.
    ///
    /// `samples` must be oldest first.
    pub fn analyze(samples: &[MetricSample], n: usize) -> Self {
        let n = n.max(1);
        let split = samples.len().saturating_sub(n);
        let current = WindowStats::from_samples(&samples[split..]);
        let previous_samples = &samples[split.saturating_sub(n)..split];
        let previous = (!previous_samples.is_empty()).then(|| WindowStats::from_samples(previous_samples));

        Self {
            window: n,
            success_rate: Trend::compare(current.success_rate, previous.map(|p| p.success_rate), true),
            avg_duration_ms: Trend::compare(
                current.avg_duration_ms,
                previous.map(|p| p.avg_duration_ms),
                false,
            ),
            avg_quality: Trend::compare(current.avg_quality, previous.map(|p| p.avg_quality), true),
        }
    }
}

/// Urgency of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nice to have
    Low,
    /// Worth scheduling
    Medium,
    /// Address soon
    High,
    /// Address now
    Critical,
}

/// A textual suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Urgency
    pub priority: Priority,

    /// What it is about (`success_rate`, `quality`, a category, a transformation)
    pub area: String,

    /// The suggestion
    pub message: String,
}

impl Recommendation {
    fn new(priority: Priority, area: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            priority,
            area: area.into(),
            message: message.into(),
        }
    }
}

fn category_tip(category: Category) -> &'static str {
    match category {
        Category::Syntax => "syntax errors dominate; ask the generator to close every block and script element",
        Category::FrameworkContract => "SDK contract violations dominate; put the InputBridge init call in the generation template",
        Category::RuntimeSafety => "unsafe reads dominate; prompt for optional chaining on sensor payloads",
        Category::Performance => "performance issues dominate; steer animation towards requestAnimationFrame",
        Category::Security => "security issues dominate; forbid eval, document.write and http script sources",
        Category::Accessibility => "accessibility gaps dominate; include lang, viewport and alt text in templates",
    }
}

/// Recommendations for a sample window and fix ledger, most urgent first.
pub fn recommend(samples: &[MetricSample], ledger: &FixLedger, config: &MetricsConfig) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let stats = WindowStats::from_samples(samples);

    if !stats.is_empty() {
        let rate = stats.success_rate;
        if rate < config.success_rate_critical {
            out.push(Recommendation::new(
                Priority::Critical,
                "success_rate",
                format!("success rate {:.0}% is critically low; review failing generations", rate * 100.0),
            ));
        } else if rate < config.success_rate_warning {
            out.push(Recommendation::new(
                Priority::High,
                "success_rate",
                format!("success rate {:.0}% is below target", rate * 100.0),
            ));
        }

        let duration = stats.avg_duration_ms;
        if duration > config.duration_critical_ms {
            out.push(Recommendation::new(
                Priority::High,
                "duration",
                format!("average duration {:.0}ms is far too slow; check sandbox and repair cost", duration),
            ));
        } else if duration > config.duration_warning_ms {
            out.push(Recommendation::new(
                Priority::Medium,
                "duration",
                format!("average duration {:.0}ms is above target", duration),
            ));
        }

        let quality = stats.avg_quality;
        if quality < config.quality_critical {
            out.push(Recommendation::new(
                Priority::High,
                "quality",
                format!("average quality {:.0} is critically low; enable auto-fix or tighten prompts", quality),
            ));
        } else if quality < config.quality_warning {
            out.push(Recommendation::new(
                Priority::Medium,
                "quality",
                format!("average quality {:.0} is below target", quality),
            ));
        }
    }

    let mut categories: BTreeMap<Category, usize> = BTreeMap::new();
    for sample in samples {
        for category in &sample.categories {
            *categories.entry(*category).or_default() += 1;
        }
    }
    let mut dominant: Vec<(Category, usize)> = categories.into_iter().collect();
    dominant.sort_by(|a, b| b.1.cmp(&a.1));
    for (category, _) in dominant.into_iter().take(2) {
        out.push(Recommendation::new(Priority::Low, category.as_str(), category_tip(category)));
    }

    for (id, fix) in ledger.unreliable(config.min_fix_attempts) {
        out.push(Recommendation::new(
            Priority::Medium,
            id,
            format!(
                "transformation '{}' resolved only {} of {} findings; review or disable it",
                id, fix.successes, fix.attempts
            ),
        ));
    }

    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(success: bool, duration_ms: u64, quality: f64) -> MetricSample {
        MetricSample {
            timestamp: Utc::now(),
            duration_ms,
            success,
            quality_score: quality,
            type_tag: "game".to_string(),
            finding_count: 0,
            fix_count: 0,
            categories: vec![],
        }
    }

    #[test]
    fn test_duration_decrease_is_improving() {
        let trend = Trend::compare(100.0, Some(200.0), false);
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert_eq!(trend.delta, -100.0);
    }

    #[test]
    fn test_no_previous_window_is_stable() {
        let samples: Vec<_> = (0..5).map(|_| sample(true, 10, 90.0)).collect();
        let report = TrendReport::analyze(&samples, 50);
        assert_eq!(report.success_rate.direction, TrendDirection::Stable);
        assert_eq!(report.avg_quality.current, 90.0);
    }

    #[test]
    fn test_partial_previous_window() {
        let mut samples: Vec<_> = (0..3).map(|_| sample(true, 10, 90.0)).collect();
        samples.extend((0..10).map(|_| sample(false, 10, 0.0)));
        let report = TrendReport::analyze(&samples, 10);
        assert_eq!(report.success_rate.previous, 1.0);
        assert_eq!(report.success_rate.direction, TrendDirection::Declining);
    }

    #[test]
    fn test_recommendations_by_threshold() {
        let config = MetricsConfig::default();
        let healthy: Vec<_> = (0..10).map(|_| sample(true, 100, 90.0)).collect();
        assert!(recommend(&healthy, &FixLedger::new(), &config).is_empty());

        let mut poor: Vec<_> = (0..6).map(|_| sample(true, 20_000, 60.0)).collect();
        poor.extend((0..4).map(|_| sample(false, 20_000, 0.0)));
        let recs = recommend(&poor, &FixLedger::new(), &config);
        assert_eq!(recs[0].priority, Priority::Critical);
        assert_eq!(recs[0].area, "success_rate");
        assert!(recs.iter().any(|r| r.area == "duration" && r.priority == Priority::High));
        assert!(recs.iter().any(|r| r.area == "quality" && r.priority == Priority::High));
    }

    #[test]
    fn test_category_tips() {
        let mut samples: Vec<_> = (0..4).map(|_| sample(true, 10, 95.0)).collect();
        samples[0].categories = vec![Category::Security, Category::Syntax];
        samples[1].categories = vec![Category::Security];
        samples[2].categories = vec![Category::Accessibility];
        let recs = recommend(&samples, &FixLedger::new(), &MetricsConfig::default());
        let areas: Vec<&str> = recs.iter().map(|r| r.area.as_str()).collect();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0], "security");
    }
}
