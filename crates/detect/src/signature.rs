//! Named error signatures.

use artguard_core::{compile_pattern, ArtifactText, Category, Finding, Location, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{PatternError, Result};

/// Which view of the artifact a signature's patterns run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The raw document, markup included
    Document,
    /// Inline script code with comments and strings masked
    #[default]
    Code,
}

/// Input handed to a matcher.
pub struct MatchContext<'a> {
    /// Parsed artifact
    pub text: &'a ArtifactText<'a>,

    /// Content type tag
    pub type_tag: &'a str,
}

impl<'a> MatchContext<'a> {
    fn view(&self, scope: Scope) -> &str {
        match scope {
            Scope::Document => self.text.source(),
            Scope::Code => self.text.code(),
        }
    }
}

/// A positive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchHit {
    /// Where it matched, when the matcher can tell
    pub location: Option<Location>,
}

impl MatchHit {
    /// Hit at a known location.
    pub fn at(location: Location) -> Self {
        Self {
            location: Some(location),
        }
    }
}

/// Closure matcher. `Err` is reported as an analysis error.
pub type CustomMatcher =
    dyn Fn(&MatchContext<'_>) -> std::result::Result<Option<MatchHit>, String> + Send + Sync;

/// How a signature decides that it matches.
#[derive(Clone)]
pub enum Matcher {
    /// Any of the patterns occurs
    Present(Vec<Regex>),
    /// The pattern never occurs
    Absent(Regex),
    /// One of the patterns occurs while `unless` never does
    PresentWithout {
        /// Triggering patterns
        patterns: Vec<Regex>,
        /// Pattern whose presence cancels the match
        unless: Regex,
    },
    /// Openers and closers do not pair up in script code
    Balance {
        /// Opening character
        open: char,
        /// Closing character
        close: char,
    },
    /// Arbitrary logic
    Custom(Arc<CustomMatcher>),
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Present(p) => f.debug_tuple("Present").field(p).finish(),
            Matcher::Absent(p) => f.debug_tuple("Absent").field(p).finish(),
            Matcher::PresentWithout { patterns, unless } => f
                .debug_struct("PresentWithout")
                .field("patterns", patterns)
                .field("unless", unless)
                .finish(),
            Matcher::Balance { open, close } => f
                .debug_struct("Balance")
                .field("open", open)
                .field("close", close)
                .finish(),
            Matcher::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Matcher {
    fn first_hit(patterns: &[Regex], ctx: &MatchContext<'_>, scope: Scope) -> Option<MatchHit> {
        let view = ctx.view(scope);
        patterns
            .iter()
            .filter_map(|p| p.find(view))
            .min_by_key(|m| m.start())
            .map(|m| MatchHit::at(ctx.text.location(m.start())))
    }

    /// Evaluate against an artifact.
    pub fn evaluate(
        &self,
        ctx: &MatchContext<'_>,
        scope: Scope,
    ) -> std::result::Result<Option<MatchHit>, String> {
        Ok(match self {
            Matcher::Present(patterns) => Self::first_hit(patterns, ctx, scope),
            Matcher::Absent(pattern) => {
                if pattern.is_match(ctx.view(scope)) {
                    None
                } else {
                    Some(MatchHit::default())
                }
            }
            Matcher::PresentWithout { patterns, unless } => {
                if unless.is_match(ctx.view(scope)) {
                    None
                } else {
                    Self::first_hit(patterns, ctx, scope)
                }
            }
            Matcher::Balance { open, close } => {
                let balance = ctx.text.balance(*open, *close);
                if balance.is_balanced() {
                    None
                } else {
                    Some(MatchHit {
                        location: balance.first_offset.map(|o| ctx.text.location(o)),
                    })
                }
            }
            Matcher::Custom(matcher) => return matcher(ctx),
        })
    }
}

/// A named error signature.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Finding kind produced on match
    pub kind: String,

    /// Finding message
    pub description: String,

    /// Concern area
    pub category: Category,

    /// Urgency
    pub severity: Severity,

    /// View the patterns run over
    pub scope: Scope,

    /// Match logic
    pub matcher: Matcher,

    /// Transformation able to fix it
    pub suggested_fix: Option<String>,

    /// Recommendation shown when it matches
    pub advice: Option<String>,

    /// Only check these type tags (empty means all)
    pub only_types: Vec<String>,

    /// Never check these type tags
    pub exempt_types: Vec<String>,
}

impl Signature {
    /// Whether the signature is checked for a type tag.
    pub fn applies_to(&self, type_tag: &str) -> bool {
        let listed = |types: &[String]| types.iter().any(|t| t.eq_ignore_ascii_case(type_tag));
        (self.only_types.is_empty() || listed(&self.only_types)) && !listed(&self.exempt_types)
    }

    /// Evaluate and turn a hit into a finding.
    pub fn check(&self, ctx: &MatchContext<'_>) -> std::result::Result<Option<Finding>, String> {
        if !self.applies_to(ctx.type_tag) {
            return Ok(None);
        }
        let Some(hit) = self.matcher.evaluate(ctx, self.scope)? else {
            return Ok(None);
        };
        let mut finding = Finding::new(&self.kind, self.severity, self.category, &self.description);
        if let Some(location) = hit.location {
            finding = finding.at(location);
        }
        if let Some(fix) = &self.suggested_fix {
            finding = finding.with_fix(fix);
        }
        Ok(Some(finding))
    }
}

/// Builder for signatures.
pub struct SignatureBuilder {
    kind: String,
    description: String,
    category: Category,
    severity: Severity,
    scope: Scope,
    matches: Vec<String>,
    requires: Option<String>,
    unless: Option<String>,
    balance: Option<(char, char)>,
    custom: Option<Arc<CustomMatcher>>,
    suggested_fix: Option<String>,
    advice: Option<String>,
    only_types: Vec<String>,
    exempt_types: Vec<String>,
}

impl SignatureBuilder {
    /// Start a signature for a finding kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: String::new(),
            category: Category::Syntax,
            severity: Severity::Medium,
            scope: Scope::Code,
            matches: Vec::new(),
            requires: None,
            unless: None,
            balance: None,
            custom: None,
            suggested_fix: None,
            advice: None,
            only_types: Vec::new(),
            exempt_types: Vec::new(),
        }
    }

    /// Set description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Set category.
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Set severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set scope.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Match when this pattern occurs. May be given several times.
    pub fn matches(mut self, pattern: impl Into<String>) -> Self {
        self.matches.push(pattern.into());
        self
    }

    /// Match when this pattern never occurs.
    pub fn requires(mut self, pattern: impl Into<String>) -> Self {
        self.requires = Some(pattern.into());
        self
    }

    /// Cancel a `matches` hit when this pattern occurs.
    pub fn unless(mut self, pattern: impl Into<String>) -> Self {
        self.unless = Some(pattern.into());
        self
    }

    /// Match on unbalanced brackets.
    pub fn balance(mut self, open: char, close: char) -> Self {
        self.balance = Some((open, close));
        self
    }

    /// Match with a closure.
    pub fn custom<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&MatchContext<'_>) -> std::result::Result<Option<MatchHit>, String> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(matcher));
        self
    }

    /// Set the fixing transformation.
    pub fn fix(mut self, id: impl Into<String>) -> Self {
        self.suggested_fix = Some(id.into());
        self
    }

    /// Set the recommendation text.
    pub fn advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = Some(advice.into());
        self
    }

    /// Restrict to these type tags.
    pub fn only_types(mut self, types: Vec<String>) -> Self {
        self.only_types = types;
        self
    }

    /// Skip these type tags.
    pub fn exempt_types(mut self, types: Vec<String>) -> Self {
        self.exempt_types = types;
        self
    }

    /// Build the signature.
    pub fn build(self) -> Result<Signature> {
        let invalid = |reason: &str| PatternError::InvalidSignature {
            kind: self.kind.clone(),
            reason: reason.to_string(),
        };
        if self.kind.trim().is_empty() {
            return Err(invalid("kind cannot be empty"));
        }

        let compile_all = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| compile_pattern(p).map_err(PatternError::from))
                .collect()
        };

        let matcher = if let Some(custom) = self.custom.clone() {
            Matcher::Custom(custom)
        } else if let Some((open, close)) = self.balance {
            Matcher::Balance { open, close }
        } else if let Some(requires) = &self.requires {
            if !self.matches.is_empty() {
                return Err(invalid("`requires` cannot be combined with `matches`"));
            }
            Matcher::Absent(compile_pattern(requires)?)
        } else if self.matches.is_empty() {
            return Err(invalid("no matcher defined"));
        } else if let Some(unless) = &self.unless {
            Matcher::PresentWithout {
                patterns: compile_all(&self.matches)?,
                unless: compile_pattern(unless)?,
            }
        } else {
            Matcher::Present(compile_all(&self.matches)?)
        };

        let description = if self.description.is_empty() {
            self.kind.clone()
        } else {
            self.description
        };

        Ok(Signature {
            kind: self.kind,
            description,
            category: self.category,
            severity: self.severity,
            scope: self.scope,
            matcher,
            suggested_fix: self.suggested_fix,
            advice: self.advice,
            only_types: self.only_types,
            exempt_types: self.exempt_types,
        })
    }
}

/// Declarative signature, as written in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub severity: Severity,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub matches: Vec<String>,
    #[serde(default)]
    pub requires: Option<String>,
    #[serde(default)]
    pub unless: Option<String>,
    #[serde(default)]
    pub fix: Option<String>,
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub only_types: Vec<String>,
    #[serde(default)]
    pub exempt_types: Vec<String>,
}

impl SignatureSpec {
    /// Compile into a signature.
    pub fn build(&self) -> Result<Signature> {
        let mut builder = SignatureBuilder::new(&self.kind)
            .description(&self.description)
            .category(self.category)
            .severity(self.severity)
            .scope(self.scope)
            .only_types(self.only_types.clone())
            .exempt_types(self.exempt_types.clone());
        for pattern in &self.matches {
            builder = builder.matches(pattern);
        }
        if let Some(requires) = &self.requires {
            builder = builder.requires(requires);
        }
        if let Some(unless) = &self.unless {
            builder = builder.unless(unless);
        }
        if let Some(fix) = &self.fix {
            builder = builder.fix(fix);
        }
        if let Some(advice) = &self.advice {
            builder = builder.advice(advice);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(signature: &Signature, source: &str, type_tag: &str) -> Option<Finding> {
        let text = ArtifactText::parse(source);
        let ctx = MatchContext {
            text: &text,
            type_tag,
        };
        signature.check(&ctx).unwrap()
    }

    #[test]
    fn test_present_matcher_reports_first_location() {
        let signature = SignatureBuilder::new("eval-usage")
            .severity(Severity::High)
            .category(Category::Security)
            .matches(r"\beval\s*\(")
            .build()
            .unwrap();
        let finding = check(&signature, "<script>\nx();\neval(s);\n</script>", "game").unwrap();
        assert_eq!(finding.location, Some(Location::at(3, 1)));
        assert_eq!(finding.message, "eval-usage");
    }

    #[test]
    fn test_absent_matcher_respects_scope() {
        let signature = SignatureBuilder::new("missing-doctype")
            .scope(Scope::Document)
            .requires(r"(?i)<!doctype html")
            .build()
            .unwrap();
        assert!(check(&signature, "<!DOCTYPE html><p></p>", "game").is_none());
        assert!(check(&signature, "<p></p>", "game").is_some());

        let code_scoped = SignatureBuilder::new("needs-init")
            .requires(r"init\(\)")
            .build()
            .unwrap();
        assert!(check(&code_scoped, "<script>// init()\n</script>", "game").is_some());
    }

    #[test]
    fn test_present_without() {
        let signature = SignatureBuilder::new("interval-without-clear")
            .matches(r"setInterval\(")
            .unless(r"clearInterval\(")
            .build()
            .unwrap();
        assert!(check(&signature, "<script>setInterval(f, 10)</script>", "game").is_some());
        assert!(check(&signature, "<script>setInterval(f, 10); clearInterval(t)</script>", "game").is_none());
    }

    #[test]
    fn test_type_applicability() {
        let signature = SignatureBuilder::new("k")
            .matches("x")
            .exempt_types(vec!["static".to_string()])
            .build()
            .unwrap();
        assert!(signature.applies_to("game"));
        assert!(!signature.applies_to("STATIC"));

        let only = SignatureBuilder::new("k")
            .matches("x")
            .only_types(vec!["game".to_string()])
            .build()
            .unwrap();
        assert!(only.applies_to("game"));
        assert!(!only.applies_to("quiz"));
    }

    #[test]
    fn test_builder_rejects_incomplete_definitions() {
        assert!(matches!(
            SignatureBuilder::new("k").build(),
            Err(PatternError::InvalidSignature { .. })
        ));
        assert!(SignatureBuilder::new("k").matches("a").requires("b").build().is_err());
        assert!(matches!(
            SignatureBuilder::new("k").matches("(").build(),
            Err(PatternError::Core(_))
        ));
    }

    #[test]
    fn test_custom_matcher() {
        let signature = SignatureBuilder::new("long-document")
            .custom(|ctx| Ok((ctx.text.source().len() > 10).then(MatchHit::default)))
            .build()
            .unwrap();
        assert!(check(&signature, "short", "game").is_none());
        assert!(check(&signature, "a much longer document", "game").is_some());
    }

    #[test]
    fn test_spec_builds_signature() {
        let spec: SignatureSpec = serde_json::from_str(
            r#"{"kind": "alert-call", "category": "accessibility", "severity": "low",
                "matches": ["\\balert\\s*\\("], "advice": "use an in-page message"}"#,
        )
        .unwrap();
        let signature = spec.build().unwrap();
        assert_eq!(signature.scope, Scope::Code);
        let finding = check(&signature, "<script>alert('hi')</script>", "game").unwrap();
        assert_eq!(finding.category, Category::Accessibility);
        assert_eq!(signature.advice.as_deref(), Some("use an in-page message"));
    }
}
