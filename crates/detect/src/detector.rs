//! Detector: combines the pattern pass with the sandbox trial run.

use artguard_core::{
    count_by_category, dedup_findings, sort_by_severity, ArtifactText, Category, CompiledContract,
    DetectionConfidence, DetectionReport, Finding, FrameworkContract, Location, Severity,
    SeverityCounts,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::library::PatternLibrary;
use crate::sandbox::{runtime_advice, translate_error, ProcessSandbox, Sandbox, SandboxConfig, SandboxOutcome};
use crate::signature::MatchContext;

/// Detector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Run the sandbox pass
    pub sandbox_enabled: bool,

    /// Hard limit for the sandbox pass
    pub sandbox_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sandbox_enabled: true,
            sandbox_timeout_ms: 500,
        }
    }
}

impl DetectorConfig {
    /// Enable or disable the sandbox pass.
    pub fn with_sandbox_enabled(mut self, enabled: bool) -> Self {
        self.sandbox_enabled = enabled;
        self
    }

    /// Set the sandbox time limit.
    pub fn with_sandbox_timeout_ms(mut self, ms: u64) -> Self {
        self.sandbox_timeout_ms = ms;
        self
    }
}

/// Finds known error signatures in artifacts.
#[derive(Clone)]
pub struct Detector {
    library: Arc<PatternLibrary>,
    sandbox: Arc<dyn Sandbox>,
    config: DetectorConfig,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("signatures", &self.library.len())
            .field("sandbox", &self.sandbox.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Detector {
    /// Create a detector.
    pub fn new(library: PatternLibrary, sandbox: Arc<dyn Sandbox>, config: DetectorConfig) -> Self {
        Self {
            library: Arc::new(library),
            sandbox,
            config,
        }
    }

    /// Default signatures, the process sandbox and default settings.
    pub fn with_defaults() -> Result<Self> {
        let contract: CompiledContract = FrameworkContract::default().compile()?;
        Ok(Self::new(
            PatternLibrary::with_defaults(&contract)?,
            Arc::new(ProcessSandbox::new(SandboxConfig::default())),
            DetectorConfig::default(),
        ))
    }

    /// The signature library.
    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// The settings.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Pattern pass only.
    pub fn detect_patterns(&self, text: &str, type_tag: &str) -> DetectionReport {
        let findings = self.scan(&ArtifactText::parse(text), type_tag);
        self.report(
            findings,
            DetectionConfidence::PatternOnly {
                reason: "runtime trial not requested".to_string(),
            },
        )
    }

    /// Pattern pass plus, when possible, the sandbox trial run.
    ///
    /// A sandbox that is disabled, unavailable or too slow degrades the
    /// result to pattern-only; it never fails detection. The trial runs on
    /// its own task, so a sandbox that panics adds an `analysis-error`
    /// finding instead of unwinding into the caller.
    pub async fn detect(&self, text: &str, type_tag: &str) -> DetectionReport {
        let (mut findings, scripts) = {
            let parsed = ArtifactText::parse(text);
            let findings = self.scan(&parsed, type_tag);
            let scripts: Vec<(Location, String)> = parsed
                .scripts()
                .iter()
                .filter(|s| !s.external && s.closed)
                .map(|s| (parsed.location(s.open_tag.start), text[s.body.clone()].to_string()))
                .filter(|(_, body)| !body.trim().is_empty())
                .collect();
            (findings, scripts)
        };

        let confidence = if !self.config.sandbox_enabled {
            DetectionConfidence::PatternOnly {
                reason: "sandbox disabled".to_string(),
            }
        } else if scripts.is_empty() {
            DetectionConfidence::Full
        } else if findings.iter().any(|f| f.kind == "runaway-loop") {
            // a blocking loop would only burn the timeout
            DetectionConfidence::PatternOnly {
                reason: "runaway loop detected; trial run skipped".to_string(),
            }
        } else {
            let sources: Vec<String> = scripts.iter().map(|(_, s)| s.clone()).collect();
            let limit = Duration::from_millis(self.config.sandbox_timeout_ms);
            let sandbox = Arc::clone(&self.sandbox);
            let mut trial = AbortOnDrop(tokio::spawn(async move { sandbox.trial_run(&sources).await }));
            match tokio::time::timeout(limit, &mut trial.0).await {
                Ok(Ok(SandboxOutcome::Completed(errors))) => {
                    for error in &errors {
                        let location = scripts.get(error.script_index).map(|(l, _)| Location::line(l.line));
                        let mut finding = translate_error(error);
                        if let Some(location) = location {
                            finding = finding.at(location);
                        }
                        findings.push(finding);
                    }
                    DetectionConfidence::Full
                }
                Ok(Ok(SandboxOutcome::Unavailable(reason))) => {
                    debug!(sandbox = self.sandbox.name(), %reason, "sandbox unavailable");
                    DetectionConfidence::PatternOnly { reason }
                }
                Ok(Err(e)) => {
                    let detail = if e.is_panic() {
                        format!("sandbox trial panicked: {}", panic_text(e.into_panic()))
                    } else {
                        format!("sandbox trial cancelled: {}", e)
                    };
                    warn!(sandbox = self.sandbox.name(), %detail, "sandbox trial failed");
                    findings.push(Finding::analysis_error(Category::RuntimeSafety, detail.clone()));
                    DetectionConfidence::PatternOnly { reason: detail }
                }
                Err(_) => {
                    warn!(
                        sandbox = self.sandbox.name(),
                        timeout_ms = self.config.sandbox_timeout_ms,
                        "sandbox trial timed out"
                    );
                    DetectionConfidence::PatternOnly {
                        reason: format!("sandbox timed out after {}ms", self.config.sandbox_timeout_ms),
                    }
                }
            }
        };

        self.report(findings, confidence)
    }

    fn scan(&self, text: &ArtifactText<'_>, type_tag: &str) -> Vec<Finding> {
        self.library.scan(&MatchContext { text, type_tag })
    }

    fn report(&self, findings: Vec<Finding>, confidence: DetectionConfidence) -> DetectionReport {
        let mut findings = dedup_findings(findings);
        sort_by_severity(&mut findings);

        let severity_level = Severity::from_weighted_sum(SeverityCounts::from_findings(&findings).weighted_sum());
        let categories = count_by_category(&findings);
        let recommendations = self.recommendations(&findings, &confidence);

        debug!(
            findings = findings.len(),
            severity = %severity_level,
            full = confidence.is_full(),
            "detection finished"
        );

        DetectionReport {
            findings,
            severity_level,
            categories,
            recommendations,
            confidence,
        }
    }

    fn recommendations(&self, findings: &[Finding], confidence: &DetectionConfidence) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut recommendations: Vec<String> = findings
            .iter()
            .filter(|f| seen.insert(f.kind.clone()))
            .map(|f| {
                let advice = self
                    .library
                    .get(&f.kind)
                    .and_then(|s| s.advice.clone())
                    .or_else(|| runtime_advice(&f.kind).map(str::to_string))
                    .unwrap_or_else(|| f.message.clone());
                format!("[{}] {}: {}", f.severity, f.kind, advice)
            })
            .collect();

        if let DetectionConfidence::PatternOnly { reason } = confidence {
            if self.config.sandbox_enabled {
                recommendations.push(format!(
                    "runtime errors were not checked ({}); results are pattern-only",
                    reason
                ));
            }
        }
        recommendations
    }
}

/// Aborts the trial task when detection returns or is itself dropped.
struct AbortOnDrop(JoinHandle<SandboxOutcome>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{NoopSandbox, RuntimeError};
    use artguard_core::Category;
    use async_trait::async_trait;

    const GAME: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta name="viewport" content="width=device-width"></head>
<body>
<script>
InputBridge.init();
InputBridge.on('tilt', (d) => move(d?.orientation?.beta));
</script>
</body>
</html>
"#;

    struct FixedSandbox(Vec<RuntimeError>);

    #[async_trait]
    impl Sandbox for FixedSandbox {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn trial_run(&self, _scripts: &[String]) -> SandboxOutcome {
            SandboxOutcome::Completed(self.0.clone())
        }
    }

    struct SlowSandbox;

    #[async_trait]
    impl Sandbox for SlowSandbox {
        fn name(&self) -> &str {
            "slow"
        }

        async fn trial_run(&self, _scripts: &[String]) -> SandboxOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            SandboxOutcome::Completed(Vec::new())
        }
    }

    struct PanickingSandbox;

    #[async_trait]
    impl Sandbox for PanickingSandbox {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn trial_run(&self, _scripts: &[String]) -> SandboxOutcome {
            panic!("runtime bridge crashed")
        }
    }

    fn detector(sandbox: Arc<dyn Sandbox>) -> Detector {
        let contract = CompiledContract::default_contract().unwrap();
        Detector::new(
            PatternLibrary::with_defaults(&contract).unwrap(),
            sandbox,
            DetectorConfig::default(),
        )
    }

    #[test]
    fn test_clean_artifact() {
        let report = detector(Arc::new(NoopSandbox)).detect_patterns(GAME, "game");
        assert!(report.is_clean(), "{:?}", report.findings);
        assert_eq!(report.severity_level, Severity::Low);
        assert!(report.categories.is_empty());
    }

    #[test]
    fn test_missing_init_single_contract_finding() {
        let text = GAME.replace("InputBridge.init();\n", "");
        let report = detector(Arc::new(NoopSandbox)).detect_patterns(&text, "game");
        let contract: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.category == Category::FrameworkContract)
            .collect();
        assert_eq!(contract.len(), 1);
        assert_eq!(contract[0].kind, "missing-sdk-init");
        assert_eq!(contract[0].severity, Severity::Critical);
        assert_eq!(report.categories[&Category::FrameworkContract], 1);
        assert!(report.recommendations[0].starts_with("[critical] missing-sdk-init"));
    }

    #[test]
    fn test_severity_rollup() {
        let text = GAME
            .replace("InputBridge.init();\n", "")
            .replace("<!DOCTYPE html>\n", "");
        let report = detector(Arc::new(NoopSandbox)).detect_patterns(&text, "game");
        // critical (10) + low (1)
        assert_eq!(report.severity_counts().weighted_sum(), 11);
        assert_eq!(report.severity_level, Severity::High);
    }

    #[tokio::test]
    async fn test_sandbox_errors_become_findings() {
        let sandbox = FixedSandbox(vec![
            RuntimeError {
                script_index: 0,
                message: "ReferenceError: move is not defined".to_string(),
            },
            RuntimeError {
                script_index: 0,
                message: "ReferenceError: move is not defined".to_string(),
            },
        ]);
        let report = detector(Arc::new(sandbox)).detect(GAME, "game").await;
        assert!(report.confidence.is_full());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, "undefined-reference");
        assert_eq!(report.findings[0].location, Some(Location::line(5)));
    }

    #[tokio::test]
    async fn test_unavailable_sandbox_degrades() {
        let report = detector(Arc::new(NoopSandbox)).detect(GAME, "game").await;
        assert!(matches!(report.confidence, DetectionConfidence::PatternOnly { .. }));
        assert!(report.findings.is_empty());
        assert!(report.recommendations[0].contains("pattern-only"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sandbox_timeout_degrades() {
        let report = detector(Arc::new(SlowSandbox)).detect(GAME, "game").await;
        match report.confidence {
            DetectionConfidence::PatternOnly { reason } => assert!(reason.contains("500ms")),
            other => panic!("unexpected confidence {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_sandbox_becomes_analysis_error() {
        let report = detector(Arc::new(PanickingSandbox)).detect(GAME, "game").await;
        match &report.confidence {
            DetectionConfidence::PatternOnly { reason } => {
                assert!(reason.contains("runtime bridge crashed"), "{}", reason)
            }
            other => panic!("unexpected confidence {:?}", other),
        }
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, artguard_core::ANALYSIS_ERROR_KIND);
        assert_eq!(report.findings[0].category, Category::RuntimeSafety);
        assert_eq!(report.findings[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_runaway_loop_skips_trial() {
        let text = GAME.replace("InputBridge.init();", "InputBridge.init();\nwhile (true) { tick(); }");
        let report = detector(Arc::new(SlowSandbox)).detect(&text, "game").await;
        assert!(!report.confidence.is_full());
        assert_eq!(report.findings[0].kind, "runaway-loop");
    }

    #[tokio::test]
    async fn test_disabled_sandbox() {
        let contract = CompiledContract::default_contract().unwrap();
        let detector = Detector::new(
            PatternLibrary::with_defaults(&contract).unwrap(),
            Arc::new(FixedSandbox(Vec::new())),
            DetectorConfig::default().with_sandbox_enabled(false),
        );
        let report = detector.detect(GAME, "game").await;
        assert!(!report.confidence.is_full());
        assert!(report.recommendations.is_empty());
    }
}
