//! Rolling sample log with windowed statistics.

use artguard_core::{Category, Clock, MetricSample, MetricToken, RepairResult, SystemClock, Time};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::config::MetricsConfig;
use crate::error::{MetricsError, Result};
use crate::learning::{FixLedger, FixStats};
use crate::sample::{MetricOutcome, MetricRequest, WindowStats};
use crate::trends::{recommend, Recommendation, TrendReport};

/// Overall health derived from the last hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Success rate at or above the warning threshold
    Healthy,
    /// Below the warning threshold
    Degraded,
    /// Below the critical threshold
    Critical,
    /// Nothing recorded in the last hour
    Idle,
}

/// Snapshot returned by [`MetricsAggregator::get_current_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStatus {
    /// Samples in the log
    pub total_samples: usize,

    /// Runs started but not completed
    pub in_flight: usize,

    /// Last-hour window
    pub last_hour: WindowStats,

    /// Health classification
    pub health: Health,
}

/// The three rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Windows {
    /// Samples of the last hour
    pub last_hour: WindowStats,

    /// Samples of the last 24 hours
    pub last_day: WindowStats,

    /// Samples of the last 7 days
    pub last_week: WindowStats,
}

/// Breakdown returned by [`MetricsAggregator::get_detailed_stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedStats {
    /// Rolling windows
    pub windows: Windows,

    /// Stats over the whole log, by type tag
    pub by_type: BTreeMap<String, WindowStats>,

    /// Samples that saw each finding category
    pub categories: BTreeMap<Category, usize>,

    /// Learned fix outcomes
    pub fixes: BTreeMap<String, FixStats>,
}

/// Everything at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// When the report was built
    pub generated_at: Time,

    /// Current status
    pub status: CurrentStatus,

    /// Detailed stats
    pub stats: DetailedStats,

    /// Trends over the configured window
    pub trends: TrendReport,

    /// Recommendations, most urgent first
    pub recommendations: Vec<Recommendation>,
}

struct InFlight {
    request: MetricRequest,
    started: Time,
}

#[derive(Default)]
struct State {
    samples: VecDeque<MetricSample>,
    in_flight: HashMap<MetricToken, InFlight>,
    fixes: FixLedger,
}

/// Records run outcomes and derives statistics from them.
pub struct MetricsAggregator {
    config: MetricsConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl std::fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl MetricsAggregator {
    /// Aggregator on the wall clock.
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Aggregator on an injected clock.
    pub fn with_clock(config: MetricsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(State::default()),
        }
    }

    /// The settings.
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start measuring a run.
    pub fn record_start(&self, request: MetricRequest) -> MetricToken {
        let started = self.clock.now();
        let token = MetricToken::new();
        self.lock().in_flight.insert(token, InFlight { request, started });
        token
    }

    /// Finish a run and append its sample.
    pub fn record_complete(&self, token: MetricToken, outcome: MetricOutcome) -> Result<MetricSample> {
        let now = self.clock.now();
        let mut state = self.lock();
        let run = state
            .in_flight
            .remove(&token)
            .ok_or(MetricsError::UnknownToken(token))?;

        let sample = MetricSample {
            timestamp: now,
            duration_ms: (now - run.started).num_milliseconds().max(0) as u64,
            success: outcome.success,
            quality_score: outcome.quality_score(),
            type_tag: run.request.type_tag,
            finding_count: outcome.remaining_findings,
            fix_count: outcome.fix_count,
            categories: outcome.categories,
        };
        debug!(
            label = run.request.label.as_deref().unwrap_or("-"),
            duration_ms = sample.duration_ms,
            quality = sample.quality_score,
            "metric sample recorded"
        );

        state.samples.push_back(sample.clone());
        while state.samples.len() > self.config.max_samples {
            state.samples.pop_front();
        }
        Ok(sample)
    }

    /// Drop a run that will never complete. Returns whether it was in flight.
    pub fn discard(&self, token: MetricToken) -> bool {
        let removed = self.lock().in_flight.remove(&token);
        if let Some(run) = &removed {
            debug!(
                label = run.request.label.as_deref().unwrap_or("-"),
                "metric run discarded"
            );
        }
        removed.is_some()
    }

    /// Feed a repair run to the fix ledger.
    pub fn record_repair(&self, result: &RepairResult) {
        self.lock().fixes.record(result);
    }

    /// Learned success rate of a transformation.
    pub fn fix_success_rate(&self, transformation_id: &str) -> Option<f64> {
        self.lock().fixes.get(transformation_id)?.success_rate()
    }

    /// Copy of the sample log, oldest first.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.lock().samples.iter().cloned().collect()
    }

    /// Stats over samples newer than `span`.
    pub fn window(&self, span: chrono::Duration) -> WindowStats {
        let since = self.clock.now() - span;
        let state = self.lock();
        WindowStats::from_samples(state.samples.iter().filter(|s| s.timestamp > since))
    }

    /// Hour, day and week windows.
    pub fn windows(&self) -> Windows {
        Windows {
            last_hour: self.window(chrono::Duration::hours(1)),
            last_day: self.window(chrono::Duration::days(1)),
            last_week: self.window(chrono::Duration::weeks(1)),
        }
    }

    /// Trends over the configured window.
    pub fn analyze_trends(&self) -> TrendReport {
        self.analyze_trends_over(self.config.trend_window)
    }

    /// Trends comparing the last `n` samples with the `n` before them.
    pub fn analyze_trends_over(&self, n: usize) -> TrendReport {
        let state = self.lock();
        let samples = state.samples.iter().cloned().collect::<Vec<_>>();
        TrendReport::analyze(&samples, n)
    }

    /// Recommendations over the configured trend window.
    pub fn generate_recommendations(&self) -> Vec<Recommendation> {
        let state = self.lock();
        let skip = state.samples.len().saturating_sub(self.config.trend_window);
        let recent: Vec<MetricSample> = state.samples.iter().skip(skip).cloned().collect();
        recommend(&recent, &state.fixes, &self.config)
    }

    /// Status snapshot.
    pub fn get_current_status(&self) -> CurrentStatus {
        let last_hour = self.window(chrono::Duration::hours(1));
        let state = self.lock();
        let health = if last_hour.is_empty() {
            Health::Idle
        } else if last_hour.success_rate < self.config.success_rate_critical {
            Health::Critical
        } else if last_hour.success_rate < self.config.success_rate_warning {
            Health::Degraded
        } else {
            Health::Healthy
        };
        CurrentStatus {
            total_samples: state.samples.len(),
            in_flight: state.in_flight.len(),
            last_hour,
            health,
        }
    }

    /// Detailed breakdown.
    pub fn get_detailed_stats(&self) -> DetailedStats {
        let windows = self.windows();
        let state = self.lock();

        let mut grouped: BTreeMap<String, Vec<&MetricSample>> = BTreeMap::new();
        let mut categories: BTreeMap<Category, usize> = BTreeMap::new();
        for sample in &state.samples {
            grouped.entry(sample.type_tag.clone()).or_default().push(sample);
            for category in &sample.categories {
                *categories.entry(*category).or_default() += 1;
            }
        }
        let by_type = grouped
            .into_iter()
            .map(|(tag, samples)| (tag, WindowStats::from_samples(samples)))
            .collect();

        DetailedStats {
            windows,
            by_type,
            categories,
            fixes: state.fixes.all().clone(),
        }
    }

    /// Full report.
    pub fn generate_report(&self) -> MetricsReport {
        MetricsReport {
            generated_at: self.clock.now(),
            status: self.get_current_status(),
            stats: self.get_detailed_stats(),
            trends: self.analyze_trends(),
            recommendations: self.generate_recommendations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trends::TrendDirection;
    use artguard_core::{Finding, ManualClock, RepairAttempt, Severity};
    use chrono::Duration;

    fn aggregator(config: MetricsConfig) -> (MetricsAggregator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MetricsAggregator::with_clock(config, clock.clone()), clock)
    }

    fn run(agg: &MetricsAggregator, clock: &ManualClock, ms: i64, outcome: MetricOutcome) -> MetricSample {
        let token = agg.record_start(MetricRequest::new("game"));
        clock.advance(Duration::milliseconds(ms));
        agg.record_complete(token, outcome).unwrap()
    }

    #[test]
    fn test_duration_from_clock() {
        let (agg, clock) = aggregator(MetricsConfig::default());
        let sample = run(&agg, &clock, 1_250, MetricOutcome::success(100));
        assert_eq!(sample.duration_ms, 1_250);
        assert_eq!(sample.type_tag, "game");
        assert_eq!(agg.get_current_status().in_flight, 0);
    }

    #[test]
    fn test_unknown_token() {
        let (agg, _) = aggregator(MetricsConfig::default());
        let stray = MetricToken::new();
        let err = agg.record_complete(stray, MetricOutcome::failure()).unwrap_err();
        assert!(matches!(err, MetricsError::UnknownToken(t) if t == stray));

        let token = agg.record_start(MetricRequest::new("game"));
        agg.record_complete(token, MetricOutcome::failure()).unwrap();
        assert!(agg.record_complete(token, MetricOutcome::failure()).is_err());
    }

    #[test]
    fn test_discard_releases_token() {
        let (agg, _) = aggregator(MetricsConfig::default());
        let token = agg.record_start(MetricRequest::new("game").with_label("a"));
        assert_eq!(agg.get_current_status().in_flight, 1);

        assert!(agg.discard(token));
        assert!(!agg.discard(token));
        assert_eq!(agg.get_current_status().in_flight, 0);
        assert!(agg.samples().is_empty());
        assert!(agg.record_complete(token, MetricOutcome::failure()).is_err());
    }

    #[test]
    fn test_log_is_bounded() {
        let (agg, clock) = aggregator(MetricsConfig::default().with_max_samples(3));
        for i in 0..5 {
            run(&agg, &clock, 10, MetricOutcome::success(i * 1000));
        }
        let samples = agg.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].quality_score, 62.0);
    }

    #[test]
    fn test_windows_filter_by_time() {
        let (agg, clock) = aggregator(MetricsConfig::default());
        run(&agg, &clock, 10, MetricOutcome::failure());
        clock.advance(Duration::days(2));
        run(&agg, &clock, 10, MetricOutcome::success(0));
        clock.advance(Duration::hours(3));
        run(&agg, &clock, 10, MetricOutcome::success(0));

        let windows = agg.windows();
        assert_eq!(windows.last_hour.count, 1);
        assert_eq!(windows.last_day.count, 2);
        assert_eq!(windows.last_week.count, 3);
        assert!((windows.last_week.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recent_failures_decline() {
        let (agg, clock) = aggregator(MetricsConfig::default());
        for i in 0..50 {
            let outcome = if i >= 40 && i % 2 == 0 {
                MetricOutcome::failure()
            } else {
                MetricOutcome::success(2_000)
            };
            run(&agg, &clock, 100, outcome);
        }
        let trends = agg.analyze_trends_over(10);
        assert_eq!(trends.success_rate.direction, TrendDirection::Declining);
        assert_eq!(trends.success_rate.current, 0.5);
        assert_eq!(trends.success_rate.previous, 1.0);
        assert_eq!(trends.avg_duration_ms.direction, TrendDirection::Stable);

        assert_eq!(agg.analyze_trends().success_rate.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_status_health() {
        let (agg, clock) = aggregator(MetricsConfig::default());
        assert_eq!(agg.get_current_status().health, Health::Idle);
        run(&agg, &clock, 10, MetricOutcome::success(0));
        assert_eq!(agg.get_current_status().health, Health::Healthy);
        run(&agg, &clock, 10, MetricOutcome::failure());
        assert_eq!(agg.get_current_status().health, Health::Critical);
        agg.record_start(MetricRequest::new("game"));
        assert_eq!(agg.get_current_status().in_flight, 1);
    }

    #[test]
    fn test_fix_learning() {
        let (agg, _) = aggregator(MetricsConfig::default().with_min_fix_attempts(2));
        let finding = Finding::new("missing-doctype", Severity::Low, artguard_core::Category::Syntax, "m");
        for _ in 0..2 {
            agg.record_repair(&RepairResult {
                fixed_text: String::new(),
                applied_fixes: vec![RepairAttempt::applied(finding.clone(), "add-doctype")],
                failed_fixes: vec![],
                remaining_findings: vec![finding.clone()],
                improvement_rate: 0.0,
            });
        }
        assert_eq!(agg.fix_success_rate("add-doctype"), Some(0.0));
        assert_eq!(agg.fix_success_rate("other"), None);
        assert!(agg
            .generate_recommendations()
            .iter()
            .any(|r| r.area == "add-doctype"));
    }

    #[test]
    fn test_report_serializes() {
        let (agg, clock) = aggregator(MetricsConfig::default());
        let outcome = MetricOutcome::success(5_000)
            .with_remaining(1)
            .with_categories(vec![artguard_core::Category::Security]);
        run(&agg, &clock, 20, outcome);

        let report = agg.generate_report();
        assert_eq!(report.stats.by_type["game"].count, 1);
        assert_eq!(report.stats.categories[&artguard_core::Category::Security], 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["health"], "healthy");
        assert_eq!(json["trends"]["success_rate"]["direction"], "stable");
    }
}
