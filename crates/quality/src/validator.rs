//! Validator: runs the rule catalog and scores each category.

use artguard_core::{
    ArtifactText, Category, CategoryReport, CompiledContract, Finding, FrameworkContract,
    ValidationReport,
};
use artguard_detect::PatternLibrary;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::catalog::RuleCatalog;
use crate::error::Result;
use crate::rule::{CategoryCheck, RuleContext};
use crate::scoring::ScoringPolicy;

/// Scores artifacts against a [`RuleCatalog`].
#[derive(Debug, Clone)]
pub struct Validator {
    catalog: RuleCatalog,
    policy: ScoringPolicy,
    contract: CompiledContract,
}

impl Validator {
    /// Create a validator.
    pub fn new(catalog: RuleCatalog, policy: ScoringPolicy, contract: CompiledContract) -> Self {
        Self {
            catalog,
            policy,
            contract,
        }
    }

    /// Built-in rules over the default signatures, default scoring and the
    /// default SDK contract.
    pub fn with_defaults() -> Result<Self> {
        let contract = FrameworkContract::default().compile()?;
        let library = PatternLibrary::with_defaults(&contract)?;
        Ok(Self::new(
            RuleCatalog::builtin(&library)?,
            ScoringPolicy::default(),
            contract,
        ))
    }

    /// Replace the scoring policy.
    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The rule catalog.
    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// The scoring policy.
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Validate an artifact.
    ///
    /// Every category is evaluated independently. A rule that fails or
    /// panics contributes one critical `analysis-error` finding to its own
    /// category and the remaining rules still run.
    pub fn validate(&self, text: &str, type_tag: &str) -> ValidationReport {
        let parsed = ArtifactText::parse(text);
        let ctx = RuleContext {
            text: &parsed,
            type_tag,
            contract: &self.contract,
        };

        let mut categories = BTreeMap::new();
        for category in self.catalog.categories() {
            let findings: Vec<Finding> = self
                .catalog
                .find_by_category(category)
                .into_iter()
                .flat_map(|rule| run_rule(rule.as_ref(), category, &ctx))
                .collect();
            let score = self.policy.score(&findings);
            categories.insert(category, CategoryReport::new(score, findings));
        }

        let report = ValidationReport::assemble(categories, self.policy.min_overall_score);
        debug!(
            type_tag,
            overall_score = report.overall_score,
            is_valid = report.is_valid,
            findings = report.finding_count(),
            "validation finished"
        );
        report
    }
}

fn run_rule(rule: &dyn CategoryCheck, category: Category, ctx: &RuleContext<'_>) -> Vec<Finding> {
    match catch_unwind(AssertUnwindSafe(|| rule.check(ctx))) {
        Ok(Ok(findings)) => findings,
        Ok(Err(e)) => {
            warn!(rule = rule.name(), error = %e, "rule failed");
            vec![Finding::analysis_error(category, format!("rule '{}': {}", rule.name(), e))]
        }
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            warn!(rule = rule.name(), panic = %detail, "rule panicked");
            vec![Finding::analysis_error(category, format!("rule '{}' panicked: {}", rule.name(), detail))]
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
