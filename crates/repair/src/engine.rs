//! Repair engine: applies transformations finding by finding.

use artguard_core::{
    CompiledContract, Finding, FindingKey, RepairAttempt, RepairFailure, RepairResult,
};
use artguard_detect::Detector;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::transform::{default_transformations, Transformation};

/// Maps finding kinds to transformations and applies them.
#[derive(Clone)]
pub struct RepairEngine {
    transformations: HashMap<String, Arc<dyn Transformation>>,
    detector: Detector,
}

impl std::fmt::Debug for RepairEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.transformations.keys().map(String::as_str).collect();
        kinds.sort();
        f.debug_struct("RepairEngine").field("kinds", &kinds).finish()
    }
}

/// Text and attempts after the fix loop, before re-detection.
#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    /// Text after every applied fix
    pub text: String,

    /// Attempts that changed the text
    pub applied: Vec<RepairAttempt>,

    /// Attempts that did not
    pub failed: Vec<RepairAttempt>,
}

impl RepairEngine {
    /// Engine with no transformations.
    pub fn new(detector: Detector) -> Self {
        Self {
            transformations: HashMap::new(),
            detector,
        }
    }

    /// Engine with the default transformations for a contract.
    pub fn with_defaults(detector: Detector, contract: &CompiledContract) -> Result<Self> {
        let mut engine = Self::new(detector);
        for (kind, transformation) in default_transformations(contract)? {
            engine.register(kind, transformation);
        }
        Ok(engine)
    }

    /// Register (or replace) the transformation for a finding kind.
    pub fn register(&mut self, kind: impl Into<String>, transformation: Arc<dyn Transformation>) {
        self.transformations.insert(kind.into(), transformation);
    }

    /// Transformation registered for a finding kind.
    pub fn transformation_for(&self, kind: &str) -> Option<&Arc<dyn Transformation>> {
        self.transformations.get(kind)
    }

    /// Finding kinds with a transformation, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.transformations.keys().map(String::as_str).collect();
        kinds.sort();
        kinds
    }

    /// The detector used for re-checks.
    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Apply fixes for `findings` in order and re-detect the result.
    ///
    /// Pure function of its inputs: nothing outside the returned value changes.
    pub async fn repair(&self, text: &str, type_tag: &str, findings: &[Finding]) -> RepairResult {
        let outcome = self.apply_fixes(text, type_tag, findings);
        let remaining = self.detector.detect(&outcome.text, type_tag).await.findings;
        let improvement_rate = RepairResult::compute_improvement_rate(findings.len(), remaining.len());

        info!(
            type_tag,
            applied = outcome.applied.len(),
            failed = outcome.failed.len(),
            remaining = remaining.len(),
            improvement_rate,
            "repair finished"
        );

        RepairResult {
            fixed_text: outcome.text,
            applied_fixes: outcome.applied,
            failed_fixes: outcome.failed,
            remaining_findings: remaining,
            improvement_rate,
        }
    }

    /// The fix loop alone.
    ///
    /// Each fix runs on the text left by the previous ones. After a fix the
    /// pattern pass runs again; a fix that makes a finding appear that was
    /// not there before is reverted and recorded as a regression.
    pub fn apply_fixes(&self, text: &str, type_tag: &str, findings: &[Finding]) -> FixOutcome {
        let mut current = text.to_string();
        let mut known = self.pattern_keys(&current, type_tag);
        let mut used: HashSet<String> = HashSet::new();
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for finding in findings {
            let Some(transformation) = self.transformations.get(&finding.kind) else {
                failed.push(RepairAttempt::failed(
                    finding.clone(),
                    None,
                    RepairFailure::NoTransformation {
                        kind: finding.kind.clone(),
                    },
                ));
                continue;
            };
            let id = transformation.id().to_string();

            if used.contains(&id) {
                failed.push(RepairAttempt::failed(
                    finding.clone(),
                    Some(id.clone()),
                    RepairFailure::AlreadyResolved { by: id },
                ));
                continue;
            }

            if !transformation.needs_fix(&current) {
                failed.push(RepairAttempt::failed(finding.clone(), Some(id), RepairFailure::NoChange));
                continue;
            }

            let candidate = transformation.apply(&current);
            if candidate == current {
                failed.push(RepairAttempt::failed(finding.clone(), Some(id), RepairFailure::NoChange));
                continue;
            }

            let after = self.pattern_keys(&candidate, type_tag);
            let mut introduced: Vec<String> = after
                .iter()
                .filter(|key| !known.contains(*key))
                .map(|key| key.kind.clone())
                .collect();
            if !introduced.is_empty() {
                introduced.sort();
                introduced.dedup();
                debug!(transformation = %id, ?introduced, "fix reverted");
                failed.push(RepairAttempt::failed(
                    finding.clone(),
                    Some(id),
                    RepairFailure::IntroducedRegression { kinds: introduced },
                ));
                continue;
            }

            debug!(transformation = %id, kind = %finding.kind, "fix applied");
            current = candidate;
            known = after;
            used.insert(id.clone());
            applied.push(RepairAttempt::applied(finding.clone(), id));
        }

        FixOutcome {
            text: current,
            applied,
            failed,
        }
    }

    fn pattern_keys(&self, text: &str, type_tag: &str) -> HashSet<FindingKey> {
        self.detector
            .detect_patterns(text, type_tag)
            .findings
            .iter()
            .map(Finding::key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artguard_core::{Category, Severity};
    use artguard_detect::{DetectorConfig, NoopSandbox, PatternLibrary};

    const BROKEN: &str = r#"<html>
<head><title>Tilt</title></head>
<body>
<script>
InputBridge.on('tilt', (data) => {
  ball.x += data.orientation.gamma;
});
</script>
</body>
</html>
"#;

    fn engine() -> RepairEngine {
        let contract = CompiledContract::default_contract().unwrap();
        let detector = Detector::new(
            PatternLibrary::with_defaults(&contract).unwrap(),
            Arc::new(NoopSandbox),
            DetectorConfig::default().with_sandbox_enabled(false),
        );
        RepairEngine::with_defaults(detector, &contract).unwrap()
    }

    async fn detect(engine: &RepairEngine, text: &str) -> Vec<Finding> {
        engine.detector().detect(text, "game").await.findings
    }

    #[tokio::test]
    async fn test_repair_fixes_everything_it_can() {
        let engine = engine();
        let findings = detect(&engine, BROKEN).await;
        let kinds: HashSet<&str> = findings.iter().map(|f| f.kind.as_str()).collect();
        assert!(kinds.contains("missing-sdk-init"));
        assert!(kinds.contains("unsafe-sensor-access"));

        let result = engine.repair(BROKEN, "game", &findings).await;
        assert!(result.failed_fixes.is_empty(), "{:?}", result.failed_fixes);
        assert_eq!(result.applied_fixes.len(), findings.len());
        assert!(result.remaining_findings.is_empty(), "{:?}", result.remaining_findings);
        assert_eq!(result.improvement_rate, 100.0);
        assert!(result.fixed_text.contains("<script>\nInputBridge.init();"));
        assert!(result.fixed_text.contains("data?.orientation?.gamma"));
    }

    #[tokio::test]
    async fn test_repair_is_idempotent() {
        let engine = engine();
        let findings = detect(&engine, BROKEN).await;
        let first = engine.repair(BROKEN, "game", &findings).await;
        let second = engine.repair(&first.fixed_text, "game", &findings).await;
        assert!(second.applied_fixes.is_empty());
        assert_eq!(second.fixed_text, first.fixed_text);
        assert!(second
            .failed_fixes
            .iter()
            .all(|a| a.reason == Some(RepairFailure::NoChange)));
    }

    #[tokio::test]
    async fn test_missing_transformation_is_not_fatal() {
        let engine = engine();
        let text = "<!DOCTYPE html><html lang=\"en\"><head><meta name=\"viewport\" content=\"width=device-width\"></head><script>InputBridge.init(); eval(x);</script></html>";
        let findings = detect(&engine, text).await;
        assert_eq!(findings.len(), 1);

        let result = engine.repair(text, "game", &findings).await;
        assert!(result.applied_fixes.is_empty());
        assert_eq!(
            result.failed_fixes[0].reason,
            Some(RepairFailure::NoTransformation {
                kind: "eval-usage".to_string()
            })
        );
        assert_eq!(result.fixed_text, text);
        assert_eq!(result.improvement_rate, 0.0);
    }

    #[tokio::test]
    async fn test_second_finding_for_same_fix_is_already_resolved() {
        let engine = engine();
        let first = Finding::new("unsafe-sensor-access", Severity::High, Category::RuntimeSafety, "read a");
        let second = Finding::new("unsafe-sensor-access", Severity::High, Category::RuntimeSafety, "read b");
        let text = "<script>InputBridge.init(); f(a.orientation.beta, b.acceleration.x);</script>";
        let outcome = engine.apply_fixes(text, "game", &[first, second]);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(
            outcome.failed[0].reason,
            Some(RepairFailure::AlreadyResolved {
                by: "guard-sensor-access".to_string()
            })
        );
    }

    struct Vandal;

    impl Transformation for Vandal {
        fn id(&self) -> &str {
            "vandal"
        }

        fn needs_fix(&self, _text: &str) -> bool {
            true
        }

        fn apply(&self, text: &str) -> String {
            format!("{}<script>eval(payload)</script>", text)
        }
    }

    #[tokio::test]
    async fn test_regression_is_reverted() {
        let mut engine = engine();
        engine.register("document-write", Arc::new(Vandal));
        let text = "<script>InputBridge.init(); document.write('x');</script>";
        let findings = vec![Finding::new(
            "document-write",
            Severity::Medium,
            Category::Security,
            "document.write() can inject unescaped markup",
        )];

        let result = engine.repair(text, "game", &findings).await;
        assert_eq!(result.fixed_text, text);
        assert_eq!(
            result.failed_fixes[0].reason,
            Some(RepairFailure::IntroducedRegression {
                kinds: vec!["eval-usage".to_string()]
            })
        );
        assert!(result.improvement_rate >= 0.0);
    }

    #[tokio::test]
    async fn test_empty_findings() {
        let engine = engine();
        let result = engine.repair(BROKEN, "game", &[]).await;
        assert_eq!(result.fixed_text, BROKEN);
        assert_eq!(result.improvement_rate, 100.0);
    }

    #[test]
    fn test_kinds_sorted() {
        let binding = engine();
        let kinds = binding.kinds();
        assert_eq!(kinds.first(), Some(&"insecure-script-src"));
        assert!(kinds.contains(&"missing-sdk-init"));
    }
}
