//! Category scoring policy.

use artguard_core::{Finding, Severity};
use serde::{Deserialize, Serialize};

/// Points removed from a category's score per finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 40.0,
            high: 20.0,
            medium: 10.0,
            low: 5.0,
        }
    }
}

impl SeverityWeights {
    /// Penalty of one finding of the given severity.
    pub fn penalty(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// How category scores and the overall verdict are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Per-severity penalties
    pub weights: SeverityWeights,

    /// Minimum mean score for a valid artifact
    pub min_overall_score: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            min_overall_score: 80.0,
        }
    }
}

impl ScoringPolicy {
    /// Set the penalties.
    pub fn with_weights(mut self, weights: SeverityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the pass mark.
    pub fn with_min_overall_score(mut self, score: f64) -> Self {
        self.min_overall_score = score;
        self
    }

    /// Score of one category: 100 minus the penalties, floored at 0.
    pub fn score(&self, findings: &[Finding]) -> f64 {
        let penalty: f64 = findings.iter().map(|f| self.weights.penalty(f.severity)).sum();
        (100.0 - penalty).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artguard_core::Category;

    fn findings(severities: &[Severity]) -> Vec<Finding> {
        severities
            .iter()
            .map(|s| Finding::new("k", *s, Category::Syntax, "m"))
            .collect()
    }

    #[test]
    fn test_score_deducts_weights() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.score(&[]), 100.0);
        assert_eq!(policy.score(&findings(&[Severity::High, Severity::Low])), 75.0);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let policy = ScoringPolicy::default();
        let many = findings(&[Severity::Critical, Severity::Critical, Severity::Critical]);
        assert_eq!(policy.score(&many), 0.0);
    }

    #[test]
    fn test_partial_policy_deserializes() {
        let policy: ScoringPolicy =
            serde_json::from_str(r#"{"weights": {"critical": 50}}"#).unwrap();
        assert_eq!(policy.weights.critical, 50.0);
        assert_eq!(policy.weights.low, 5.0);
        assert_eq!(policy.min_overall_score, 80.0);
    }
}
