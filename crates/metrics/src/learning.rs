//! Per-transformation repair outcome ledger.

use artguard_core::{FindingKey, RepairFailure, RepairResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Attempt counts for one transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixStats {
    /// Times the transformation was tried
    pub attempts: u32,

    /// Times it made its finding go away
    pub successes: u32,
}

impl FixStats {
    /// Share of successful attempts, `None` before the first attempt.
    pub fn success_rate(&self) -> Option<f64> {
        (self.attempts > 0).then(|| self.successes as f64 / self.attempts as f64)
    }
}

/// Learned fix outcomes keyed by transformation id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixLedger {
    stats: BTreeMap<String, FixStats>,
}

impl FixLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn from one repair run.
    ///
    /// An applied fix counts as a success only if its finding is gone from the
    /// re-detected text. A fix that ran but changed nothing or was reverted
    /// counts as a failure. Missing or already-used transformations are not
    /// attempts of anything.
    pub fn record(&mut self, result: &RepairResult) {
        let remaining: HashSet<FindingKey> =
            result.remaining_findings.iter().map(|f| f.key()).collect();

        for attempt in &result.applied_fixes {
            if let Some(id) = &attempt.transformation_id {
                let resolved = !remaining.contains(&attempt.finding.key());
                self.count(id, resolved);
            }
        }
        for attempt in &result.failed_fixes {
            let Some(id) = &attempt.transformation_id else {
                continue;
            };
            match attempt.reason {
                Some(RepairFailure::NoChange) | Some(RepairFailure::IntroducedRegression { .. }) => {
                    self.count(id, false)
                }
                _ => {}
            }
        }
    }

    fn count(&mut self, id: &str, success: bool) {
        let entry = self.stats.entry(id.to_string()).or_default();
        entry.attempts += 1;
        entry.successes += u32::from(success);
    }

    /// Stats for one transformation.
    pub fn get(&self, id: &str) -> Option<FixStats> {
        self.stats.get(id).copied()
    }

    /// All stats, by transformation id.
    pub fn all(&self) -> &BTreeMap<String, FixStats> {
        &self.stats
    }

    /// Transformations failing at least half the time over `min_attempts` or more tries.
    pub fn unreliable(&self, min_attempts: u32) -> Vec<(&str, FixStats)> {
        self.stats
            .iter()
            .filter(|(_, s)| s.attempts >= min_attempts.max(1))
            .filter(|(_, s)| s.success_rate().map_or(false, |r| r <= 0.5))
            .map(|(id, s)| (id.as_str(), *s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artguard_core::{Category, Finding, RepairAttempt, Severity};

    fn finding(kind: &str) -> Finding {
        Finding::new(kind, Severity::High, Category::Syntax, kind)
    }

    fn result(applied: Vec<RepairAttempt>, failed: Vec<RepairAttempt>, remaining: Vec<Finding>) -> RepairResult {
        RepairResult {
            fixed_text: String::new(),
            applied_fixes: applied,
            failed_fixes: failed,
            remaining_findings: remaining,
            improvement_rate: 0.0,
        }
    }

    #[test]
    fn test_applied_but_still_present_is_failure() {
        let mut ledger = FixLedger::new();
        ledger.record(&result(
            vec![
                RepairAttempt::applied(finding("a"), "fix-a"),
                RepairAttempt::applied(finding("b"), "fix-b"),
            ],
            vec![],
            vec![finding("b")],
        ));
        assert_eq!(ledger.get("fix-a").and_then(|s| s.success_rate()), Some(1.0));
        assert_eq!(ledger.get("fix-b").and_then(|s| s.success_rate()), Some(0.0));
    }

    #[test]
    fn test_only_real_attempts_counted() {
        let mut ledger = FixLedger::new();
        ledger.record(&result(
            vec![],
            vec![
                RepairAttempt::failed(
                    finding("x"),
                    None,
                    RepairFailure::NoTransformation { kind: "x".to_string() },
                ),
                RepairAttempt::failed(
                    finding("y"),
                    Some("fix-y".to_string()),
                    RepairFailure::AlreadyResolved { by: "fix-y".to_string() },
                ),
                RepairAttempt::failed(finding("z"), Some("fix-z".to_string()), RepairFailure::NoChange),
            ],
            vec![],
        ));
        assert!(ledger.get("fix-y").is_none());
        assert_eq!(ledger.get("fix-z"), Some(FixStats { attempts: 1, successes: 0 }));
    }

    #[test]
    fn test_unreliable_needs_enough_attempts() {
        let mut ledger = FixLedger::new();
        for _ in 0..4 {
            ledger.record(&result(vec![RepairAttempt::applied(finding("a"), "fix-a")], vec![], vec![finding("a")]));
        }
        assert!(ledger.unreliable(5).is_empty());
        ledger.record(&result(vec![RepairAttempt::applied(finding("a"), "fix-a")], vec![], vec![]));
        let unreliable = ledger.unreliable(5);
        assert_eq!(unreliable.len(), 1);
        assert_eq!(unreliable[0].0, "fix-a");
    }
}
