//! Built-in validation rules.
//!
//! Every signature of the detector's [`PatternLibrary`] is scored through one
//! rule per category, so a kind the detector knows is matched in exactly one
//! place. The rules below cover what only the validator checks.
//!
//! Script-level rules run over the code view of [`ArtifactText`] so that
//! code quoted inside strings or comments is ignored. Markup-level rules run
//! over the raw document.

use artguard_core::{compile_pattern, ArtifactText, Category, Finding, Location, Severity};
use artguard_detect::{MatchContext, PatternLibrary};
use regex::Regex;
use std::sync::Arc;

use crate::error::Result;
use crate::rule::{CategoryCheck, FnRule, RuleContext};

/// Every built-in rule: the library's signatures plus the validator-only checks.
pub fn rules(library: &PatternLibrary) -> Result<Vec<Arc<dyn CategoryCheck>>> {
    let mut rules = signature_rules(library);
    rules.extend(syntax_rules()?);
    rules.extend(contract_rules());
    rules.extend(runtime_safety_rules()?);
    rules.extend(performance_rules()?);
    rules.extend(security_rules()?);
    rules.extend(accessibility_rules()?);
    Ok(rules)
}

/// Scores one category of a [`PatternLibrary`].
#[derive(Debug, Clone)]
pub struct SignatureRule {
    name: String,
    category: Category,
    library: Arc<PatternLibrary>,
}

impl SignatureRule {
    /// Rule for the library's signatures of one category.
    pub fn new(library: Arc<PatternLibrary>, category: Category) -> Self {
        Self {
            name: format!("signatures/{}", category.as_str()),
            category,
            library,
        }
    }
}

impl CategoryCheck for SignatureRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let ctx = MatchContext {
            text: ctx.text,
            type_tag: ctx.type_tag,
        };
        Ok(self.library.scan_category(&ctx, self.category))
    }
}

fn signature_rules(library: &PatternLibrary) -> Vec<Arc<dyn CategoryCheck>> {
    let library = Arc::new(library.clone());
    Category::ALL
        .iter()
        .filter(|&&category| !library.find_by_category(category).is_empty())
        .map(|&category| Arc::new(SignatureRule::new(Arc::clone(&library), category)) as Arc<dyn CategoryCheck>)
        .collect()
}

fn rule<F>(name: &str, category: Category, check: F) -> Arc<dyn CategoryCheck>
where
    F: Fn(&RuleContext<'_>) -> Result<Vec<Finding>> + Send + Sync + 'static,
{
    Arc::new(FnRule::new(name, category, check))
}

fn first_in_code(text: &ArtifactText<'_>, pattern: &Regex) -> Option<Location> {
    pattern.find(text.code()).map(|m| text.location(m.start()))
}

fn located(finding: Finding, location: Option<Location>) -> Finding {
    match location {
        Some(location) => finding.at(location),
        None => finding,
    }
}

fn syntax_rules() -> Result<Vec<Arc<dyn CategoryCheck>>> {
    let html_root = compile_pattern(r"(?i)<html\b")?;

    Ok(vec![
        rule("square-brackets", Category::Syntax, |ctx| {
            let balance = ctx.text.balance('[', ']');
            if balance.is_balanced() {
                return Ok(Vec::new());
            }
            Ok(vec![located(
                Finding::new(
                    "unbalanced-brackets",
                    Severity::High,
                    Category::Syntax,
                    "unbalanced square brackets in script code",
                ),
                balance.first_offset.map(|o| ctx.text.location(o)),
            )])
        }),
        rule("html-root", Category::Syntax, move |ctx| {
            if html_root.is_match(ctx.text.source()) {
                return Ok(Vec::new());
            }
            Ok(vec![Finding::new(
                "missing-html-root",
                Severity::Medium,
                Category::Syntax,
                "document has no <html> root element",
            )])
        }),
    ])
}

fn contract_rules() -> Vec<Arc<dyn CategoryCheck>> {
    vec![
        rule("input-handlers", Category::FrameworkContract, |ctx| {
            if !ctx.contract.contract.applies_to(ctx.type_tag) || ctx.contract.handler.is_match(ctx.text.code()) {
                return Ok(Vec::new());
            }
            let contract = &ctx.contract.contract;
            Ok(vec![Finding::new(
                "missing-input-handler",
                Severity::Medium,
                Category::FrameworkContract,
                format!("no {}.{}() input handler is registered", contract.sdk_global, contract.handler_method),
            )])
        }),
        rule("init-order", Category::FrameworkContract, |ctx| {
            if !ctx.contract.contract.applies_to(ctx.type_tag) {
                return Ok(Vec::new());
            }
            let code = ctx.text.code();
            let (Some(handler), Some(init)) = (ctx.contract.handler.find(code), ctx.contract.init.find(code)) else {
                return Ok(Vec::new());
            };
            if handler.start() > init.start() {
                return Ok(Vec::new());
            }
            let contract = &ctx.contract.contract;
            Ok(vec![Finding::new(
                "handler-before-init",
                Severity::High,
                Category::FrameworkContract,
                format!(
                    "{g}.{h}() is called before {g}.{i}()",
                    g = contract.sdk_global,
                    h = contract.handler_method,
                    i = contract.init_method
                ),
            )
            .at(ctx.text.location(handler.start()))])
        }),
    ]
}

fn runtime_safety_rules() -> Result<Vec<Arc<dyn CategoryCheck>>> {
    let json_parse = compile_pattern(r"\bJSON\s*\.\s*parse\s*\(")?;
    let try_block = compile_pattern(r"\btry\s*\{")?;
    let element_lookup =
        compile_pattern(r"\bdocument\s*\.\s*(?:getElementById|querySelector)\s*\([^)]*\)\s*\.")?;

    Ok(vec![
        rule("json-parse", Category::RuntimeSafety, move |ctx| {
            let code = ctx.text.code();
            if try_block.is_match(code) {
                return Ok(Vec::new());
            }
            Ok(first_in_code(ctx.text, &json_parse)
                .map(|location| {
                    Finding::new(
                        "unguarded-json-parse",
                        Severity::Medium,
                        Category::RuntimeSafety,
                        "JSON.parse() is called outside any try block",
                    )
                    .at(location)
                })
                .into_iter()
                .collect())
        }),
        rule("element-lookup", Category::RuntimeSafety, move |ctx| {
            Ok(first_in_code(ctx.text, &element_lookup)
                .map(|location| {
                    Finding::new(
                        "unchecked-element-lookup",
                        Severity::Low,
                        Category::RuntimeSafety,
                        "DOM lookup result is used without a null check",
                    )
                    .at(location)
                })
                .into_iter()
                .collect())
        }),
    ])
}

fn performance_rules() -> Result<Vec<Arc<dyn CategoryCheck>>> {
    let interval_delay = compile_pattern(r"\bsetInterval\s*\([^;]*?,\s*(\d+)\s*\)")?;

    Ok(vec![rule("interval-delay", Category::Performance, move |ctx| {
        let mut findings = Vec::new();
        for caps in interval_delay.captures_iter(ctx.text.code()) {
            let (Some(whole), Some(delay)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(ms) = delay.as_str().parse::<u64>() else {
                continue;
            };
            if ms < 16 {
                findings.push(
                    Finding::new(
                        "tight-interval",
                        Severity::Medium,
                        Category::Performance,
                        format!("setInterval() with a {}ms delay; use requestAnimationFrame", ms),
                    )
                    .at(ctx.text.location(whole.start())),
                );
            }
        }
        Ok(findings)
    })])
}

fn security_rules() -> Result<Vec<Arc<dyn CategoryCheck>>> {
    let inner_html = compile_pattern(r"\.innerHTML\s*\+?=")?;

    Ok(vec![rule("inner-html", Category::Security, move |ctx| {
        Ok(first_in_code(ctx.text, &inner_html)
            .map(|location| {
                Finding::new(
                    "inner-html-assignment",
                    Severity::Low,
                    Category::Security,
                    "markup assigned through innerHTML",
                )
                .at(location)
            })
            .into_iter()
            .collect())
    })])
}

fn accessibility_rules() -> Result<Vec<Arc<dyn CategoryCheck>>> {
    let title = compile_pattern(r"(?i)<title\b[^>]*>\s*[^<\s]")?;
    let img_tag = compile_pattern(r"(?i)<img\b[^>]*>")?;
    let alt_attr = compile_pattern(r"(?i)\balt\s*=")?;

    Ok(vec![
        rule("document-title", Category::Accessibility, move |ctx| {
            if title.is_match(ctx.text.source()) {
                return Ok(Vec::new());
            }
            Ok(vec![Finding::new(
                "missing-title",
                Severity::Low,
                Category::Accessibility,
                "document has no title",
            )])
        }),
        rule("image-alt", Category::Accessibility, move |ctx| {
            let source = ctx.text.source();
            Ok(img_tag
                .find_iter(source)
                .find(|tag| !alt_attr.is_match(tag.as_str()))
                .map(|tag| {
                    Finding::new(
                        "img-without-alt",
                        Severity::Low,
                        Category::Accessibility,
                        "image has no alt text",
                    )
                    .at(ctx.text.location(tag.start()))
                })
                .into_iter()
                .collect())
        }),
    ])
}
