//! Finding model - severities, categories and the findings themselves.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Kind used for synthetic findings produced when an analysis pass fails.
pub const ANALYSIS_ERROR_KIND: &str = "analysis-error";

/// Ordinal urgency of a finding.
///
/// Variants are declared from least to most urgent so that the derived
/// ordering gives `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most urgent first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Weight used when rolling several findings up into one level.
    pub fn rollup_weight(&self) -> u32 {
        match self {
            Severity::Critical => 10,
            Severity::High => 5,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }

    /// Bucket a weighted severity sum into a single level.
    pub fn from_weighted_sum(sum: u32) -> Self {
        match sum {
            s if s >= 20 => Severity::Critical,
            s if s >= 10 => Severity::High,
            s if s >= 5 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    /// Accepts the category-scoring aliases `major` and `minor` as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" | "major" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" | "minor" => Ok(Severity::Low),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Concern area a finding belongs to.
///
/// Shared by the rule catalog and the pattern library so both passes speak
/// the same taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Syntax,
    FrameworkContract,
    RuntimeSafety,
    Performance,
    Security,
    Accessibility,
}

impl Category {
    /// All categories in reporting order.
    pub const ALL: [Category; 6] = [
        Category::Syntax,
        Category::FrameworkContract,
        Category::RuntimeSafety,
        Category::Performance,
        Category::Security,
        Category::Accessibility,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Syntax => "syntax",
            Category::FrameworkContract => "framework-contract",
            Category::RuntimeSafety => "runtime-safety",
            Category::Performance => "performance",
            Category::Security => "security",
            Category::Accessibility => "accessibility",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Position of a finding inside the artifact text (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: Option<usize>,
}

impl Location {
    /// Location pointing at a whole line.
    pub fn line(line: usize) -> Self {
        Self { line, column: None }
    }

    /// Location pointing at a line and column.
    pub fn at(line: usize, column: usize) -> Self {
        Self {
            line,
            column: Some(column),
        }
    }
}

/// One concrete issue detected in an artifact.
///
/// Findings are value objects; two findings describe the same issue when
/// their [`FindingKey`]s are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable identifier of the issue type (e.g. `missing-sdk-init`)
    pub kind: String,

    /// Human readable description
    pub message: String,

    /// Urgency
    pub severity: Severity,

    /// Concern area
    pub category: Category,

    /// Where in the text it was found
    pub location: Option<Location>,

    /// Identifier of a transformation able to fix it
    pub suggested_fix: Option<String>,
}

impl Finding {
    /// Create a new finding without location or fix.
    pub fn new(
        kind: impl Into<String>,
        severity: Severity,
        category: Category,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            severity,
            category,
            location: None,
            suggested_fix: None,
        }
    }

    /// Synthetic critical finding standing in for a failed analysis pass.
    pub fn analysis_error(category: Category, detail: impl std::fmt::Display) -> Self {
        Self::new(
            ANALYSIS_ERROR_KIND,
            Severity::Critical,
            category,
            format!("{} analysis failed: {}", category, detail),
        )
    }

    /// Set the location.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the suggested fix.
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Identity used for diffing and deduplication.
    pub fn key(&self) -> FindingKey {
        FindingKey {
            kind: self.kind.clone(),
            message: self.message.clone(),
        }
    }

    /// Whether this is a critical finding.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// `(kind, message)` identity of a finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindingKey {
    pub kind: String,
    pub message: String,
}

/// Remove findings whose key was already seen, keeping the first occurrence.
pub fn dedup_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert(f.key()))
        .collect()
}

/// Sort findings most severe first; ties keep their relative order.
pub fn sort_by_severity(findings: &mut [Finding]) {
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
}

/// Per-severity finding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    /// Count the severities of a set of findings.
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            counts.add(finding.severity);
        }
        counts
    }

    /// Increment the counter for a severity.
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    /// Counter value for a severity.
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// Total number of findings counted.
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }

    /// Weighted sum used for the detector roll-up.
    pub fn weighted_sum(&self) -> u32 {
        Severity::ALL
            .iter()
            .map(|s| s.rollup_weight() * self.get(*s) as u32)
            .sum()
    }

    /// Compact `critical:1 high:0 ...` rendering.
    pub fn summary(&self) -> String {
        Severity::ALL
            .iter()
            .map(|s| format!("{}:{}", s, self.get(*s)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Count findings per category.
pub fn count_by_category<'a>(
    findings: impl IntoIterator<Item = &'a Finding>,
) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(kind: &str, severity: Severity) -> Finding {
        Finding::new(kind, severity, Category::Syntax, format!("{} happened", kind))
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_severity_aliases() {
        assert_eq!("major".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("minor".parse::<Severity>().unwrap(), Severity::Low);
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_weighted_sum_buckets() {
        assert_eq!(Severity::from_weighted_sum(20), Severity::Critical);
        assert_eq!(Severity::from_weighted_sum(19), Severity::High);
        assert_eq!(Severity::from_weighted_sum(10), Severity::High);
        assert_eq!(Severity::from_weighted_sum(5), Severity::Medium);
        assert_eq!(Severity::from_weighted_sum(4), Severity::Low);
        assert_eq!(Severity::from_weighted_sum(0), Severity::Low);
    }

    #[test]
    fn test_severity_counts() {
        let findings = vec![
            finding("a", Severity::Critical),
            finding("b", Severity::Critical),
            finding("c", Severity::Low),
        ];
        let counts = SeverityCounts::from_findings(&findings);
        assert_eq!(counts.critical, 2);
        assert_eq!(counts.low, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.weighted_sum(), 21);
        assert_eq!(counts.summary(), "critical:2 high:0 medium:0 low:1");
    }

    #[test]
    fn test_dedup_by_kind_and_message() {
        let a = finding("a", Severity::Low);
        let mut a_elsewhere = a.clone();
        a_elsewhere.location = Some(Location::line(9));
        let other_message = Finding::new("a", Severity::Low, Category::Syntax, "different");

        let deduped = dedup_findings(vec![a.clone(), a_elsewhere, other_message]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], a);
    }

    #[test]
    fn test_sort_by_severity() {
        let mut findings = vec![
            finding("low", Severity::Low),
            finding("crit", Severity::Critical),
            finding("med", Severity::Medium),
        ];
        sort_by_severity(&mut findings);
        let kinds: Vec<_> = findings.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["crit", "med", "low"]);
    }

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(
            serde_json::to_string(&Category::FrameworkContract).unwrap(),
            "\"framework-contract\""
        );
    }

    #[test]
    fn test_analysis_error_is_critical() {
        let f = Finding::analysis_error(Category::Security, "boom");
        assert_eq!(f.kind, ANALYSIS_ERROR_KIND);
        assert!(f.is_critical());
        assert!(f.message.contains("boom"));
    }
}
