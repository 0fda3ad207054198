//! Monitor settings.

use artguard_core::{Severity, SeverityCounts};
use serde::{Deserialize, Serialize};

/// Per-severity counts of new findings that trigger an alert.
///
/// Each counter is checked on its own; 0 disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// New critical findings
    pub critical: usize,

    /// New high findings
    pub high: usize,

    /// New medium findings
    pub medium: usize,

    /// New low findings
    pub low: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical: 1,
            high: 2,
            medium: 5,
            low: 10,
        }
    }
}

impl AlertThresholds {
    /// Threshold for a severity.
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// Reasons such as `critical: 1` for every counter that was met.
    pub fn evaluate(&self, counts: &SeverityCounts) -> Vec<String> {
        Severity::ALL
            .iter()
            .filter_map(|&severity| {
                let threshold = self.get(severity);
                let count = counts.get(severity);
                (threshold > 0 && count >= threshold).then(|| format!("{}: {}", severity, count))
            })
            .collect()
    }

    /// Apply a partial update.
    pub fn apply(&mut self, update: &ThresholdsUpdate) {
        if let Some(v) = update.critical {
            self.critical = v;
        }
        if let Some(v) = update.high {
            self.high = v;
        }
        if let Some(v) = update.medium {
            self.medium = v;
        }
        if let Some(v) = update.low {
            self.low = v;
        }
    }
}

/// Partial threshold update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdsUpdate {
    pub critical: Option<usize>,
    pub high: Option<usize>,
    pub medium: Option<usize>,
    pub low: Option<usize>,
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between sweeps
    pub sweep_interval_ms: u64,

    /// Delay of the re-check after an automatic repair
    pub recheck_delay_ms: u64,

    /// Checks running at once during a sweep; 0 means no limit
    pub max_concurrent_checks: usize,

    /// Auto-fix setting of newly registered artifacts
    pub auto_fix_by_default: bool,

    /// Alert setting of newly registered artifacts
    pub alerts_by_default: bool,

    /// Alert thresholds
    pub thresholds: AlertThresholds,

    /// Event channel capacity
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 30_000,
            recheck_delay_ms: 5_000,
            max_concurrent_checks: 8,
            auto_fix_by_default: false,
            alerts_by_default: true,
            thresholds: AlertThresholds::default(),
            event_capacity: 1024,
        }
    }
}

impl MonitorConfig {
    /// Set the sweep interval.
    pub fn with_sweep_interval_ms(mut self, ms: u64) -> Self {
        self.sweep_interval_ms = ms;
        self
    }

    /// Set the re-check delay.
    pub fn with_recheck_delay_ms(mut self, ms: u64) -> Self {
        self.recheck_delay_ms = ms;
        self
    }

    /// Set the concurrency cap.
    pub fn with_max_concurrent_checks(mut self, n: usize) -> Self {
        self.max_concurrent_checks = n;
        self
    }

    /// Set the auto-fix default.
    pub fn with_auto_fix_by_default(mut self, enabled: bool) -> Self {
        self.auto_fix_by_default = enabled;
        self
    }

    /// Set the alert default.
    pub fn with_alerts_by_default(mut self, enabled: bool) -> Self {
        self.alerts_by_default = enabled;
        self
    }

    /// Set the thresholds.
    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Log alerts through tracing
    pub log: bool,

    /// POST alerts to this URL
    pub webhook_url: Option<String>,

    /// Webhook request timeout
    pub webhook_timeout_ms: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            log: true,
            webhook_url: None,
            webhook_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(critical: usize, high: usize, medium: usize, low: usize) -> SeverityCounts {
        SeverityCounts {
            critical,
            high,
            medium,
            low,
        }
    }

    #[test]
    fn test_counters_are_independent() {
        let thresholds = AlertThresholds::default();
        assert_eq!(thresholds.evaluate(&counts(1, 0, 0, 3)), vec!["critical: 1"]);
        assert_eq!(thresholds.evaluate(&counts(0, 2, 5, 0)), vec!["high: 2", "medium: 5"]);
        assert!(thresholds.evaluate(&counts(0, 1, 4, 9)).is_empty());
    }

    #[test]
    fn test_zero_disables_counter() {
        let mut thresholds = AlertThresholds::default();
        thresholds.apply(&ThresholdsUpdate {
            critical: Some(0),
            low: Some(1),
            ..Default::default()
        });
        assert_eq!(thresholds.high, 2);
        assert_eq!(thresholds.evaluate(&counts(3, 0, 0, 1)), vec!["low: 1"]);
    }

    #[test]
    fn test_config_from_partial_toml_shape() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"sweep_interval_ms": 1000, "thresholds": {"low": 3}}"#).unwrap();
        assert_eq!(config.sweep_interval_ms, 1000);
        assert_eq!(config.recheck_delay_ms, 5_000);
        assert_eq!(config.thresholds.low, 3);
        assert_eq!(config.thresholds.critical, 1);
    }
}
