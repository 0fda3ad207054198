//! Pattern library: the registry of signatures the detector matches.

use artguard_core::{
    compile_pattern, Category, CompiledContract, Finding, Severity, UNBOUNDED_LOOP_PATTERN,
};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use crate::error::{PatternError, Result};
use crate::signature::{MatchContext, MatchHit, Scope, Signature, SignatureBuilder};

/// Registry of signatures, indexed by kind and category.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    signatures: Vec<Signature>,
    by_category: BTreeMap<Category, Vec<usize>>,
}

impl PatternLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding the default signatures for a contract.
    pub fn with_defaults(contract: &CompiledContract) -> Result<Self> {
        let mut library = Self::new();
        for signature in default_signatures(contract)? {
            library.register(signature)?;
        }
        Ok(library)
    }

    /// Register a signature. Kinds must be unique.
    pub fn register(&mut self, signature: Signature) -> Result<()> {
        if self.get(&signature.kind).is_some() {
            return Err(PatternError::DuplicateSignature(signature.kind));
        }
        self.signatures.push(signature);
        self.reindex();
        Ok(())
    }

    /// Remove a signature by kind.
    pub fn unregister(&mut self, kind: &str) -> Option<Signature> {
        let pos = self.signatures.iter().position(|s| s.kind == kind)?;
        let signature = self.signatures.remove(pos);
        self.reindex();
        Some(signature)
    }

    /// Get a signature by kind.
    pub fn get(&self, kind: &str) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.kind == kind)
    }

    /// All signatures in registration order.
    pub fn list(&self) -> &[Signature] {
        &self.signatures
    }

    /// Signatures of one category.
    pub fn find_by_category(&self, category: Category) -> Vec<&Signature> {
        self.by_category
            .get(&category)
            .into_iter()
            .flat_map(|idx| idx.iter().filter_map(|&i| self.signatures.get(i)))
            .collect()
    }

    /// Number of signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Run every applicable signature.
    ///
    /// A signature whose matcher fails or panics yields an `analysis-error`
    /// finding in its category instead of aborting the scan.
    pub fn scan(&self, ctx: &MatchContext<'_>) -> Vec<Finding> {
        self.signatures.iter().filter_map(|s| run_signature(s, ctx)).collect()
    }

    /// Run the signatures of one category, with the same isolation as
    /// [`scan`](Self::scan).
    pub fn scan_category(&self, ctx: &MatchContext<'_>, category: Category) -> Vec<Finding> {
        self.find_by_category(category)
            .into_iter()
            .filter_map(|s| run_signature(s, ctx))
            .collect()
    }

    fn reindex(&mut self) {
        self.by_category.clear();
        for (i, signature) in self.signatures.iter().enumerate() {
            self.by_category.entry(signature.category).or_default().push(i);
        }
    }
}

fn run_signature(signature: &Signature, ctx: &MatchContext<'_>) -> Option<Finding> {
    match catch_unwind(AssertUnwindSafe(|| signature.check(ctx))) {
        Ok(Ok(finding)) => finding,
        Ok(Err(e)) => {
            warn!(signature = %signature.kind, error = %e, "signature matcher failed");
            Some(Finding::analysis_error(
                signature.category,
                format!("signature '{}': {}", signature.kind, e),
            ))
        }
        Err(_) => {
            warn!(signature = %signature.kind, "signature matcher panicked");
            Some(Finding::analysis_error(
                signature.category,
                format!("signature '{}' panicked", signature.kind),
            ))
        }
    }
}

/// The default signature set.
pub fn default_signatures(contract: &CompiledContract) -> Result<Vec<Signature>> {
    let sdk = &contract.contract;
    let init = contract.init.clone();
    let sensor_access = contract.sensor_access.clone();
    let unbounded = compile_pattern(UNBOUNDED_LOOP_PATTERN)?;
    let html_tag = compile_pattern(r"(?i)<html\b[^>]*>")?;
    let lang_attr = compile_pattern(r"(?i)\blang\s*=")?;

    Ok(vec![
        SignatureBuilder::new("unclosed-script-tag")
            .description("<script> element is never closed")
            .category(Category::Syntax)
            .severity(Severity::Critical)
            .custom(|ctx| {
                let (opens, closes) = ctx.text.script_tag_counts();
                if opens <= closes {
                    return Ok(None);
                }
                let location = ctx
                    .text
                    .scripts()
                    .iter()
                    .find(|s| !s.closed)
                    .map(|s| ctx.text.location(s.open_tag.start));
                Ok(Some(MatchHit { location }))
            })
            .fix("close-script-tag")
            .advice("close every <script> element with </script>")
            .build()?,
        SignatureBuilder::new("unbalanced-braces")
            .description("unbalanced braces in script code")
            .category(Category::Syntax)
            .severity(Severity::Critical)
            .balance('{', '}')
            .fix("balance-braces")
            .advice("check for a missing or extra closing brace")
            .build()?,
        SignatureBuilder::new("unbalanced-parens")
            .description("unbalanced parentheses in script code")
            .category(Category::Syntax)
            .severity(Severity::High)
            .balance('(', ')')
            .advice("check call and condition parentheses")
            .build()?,
        SignatureBuilder::new("missing-sdk-init")
            .description(format!("{}.{}() is never called", sdk.sdk_global, sdk.init_method))
            .category(Category::FrameworkContract)
            .severity(Severity::Critical)
            .custom(move |ctx| {
                Ok((!init.is_match(ctx.text.code())).then(MatchHit::default))
            })
            .exempt_types(sdk.exempt_types.clone())
            .fix("insert-sdk-init")
            .advice(format!(
                "call {} once before registering input handlers",
                sdk.init_snippet()
            ))
            .build()?,
        SignatureBuilder::new("unsafe-sensor-access")
            .description("sensor field read without optional chaining")
            .category(Category::RuntimeSafety)
            .severity(Severity::High)
            .custom(move |ctx| {
                Ok(sensor_access
                    .find(ctx.text.code())
                    .map(|m| MatchHit::at(ctx.text.location(m.start()))))
            })
            .fix("guard-sensor-access")
            .advice("read sensor payloads as data?.orientation?.beta; not every device reports every sensor")
            .build()?,
        SignatureBuilder::new("runaway-loop")
            .description("unconditional loop without break blocks the page")
            .category(Category::Performance)
            .severity(Severity::Critical)
            .custom(move |ctx| {
                Ok(ctx
                    .text
                    .unbounded_loops(&unbounded)
                    .first()
                    .map(|&o| MatchHit::at(ctx.text.location(o))))
            })
            .advice("drive animation with requestAnimationFrame instead of a busy loop")
            .build()?,
        SignatureBuilder::new("interval-without-clear")
            .description("setInterval() is never cleared")
            .category(Category::Performance)
            .severity(Severity::Medium)
            .matches(r"\bsetInterval\s*\(")
            .unless(r"\bclearInterval\s*\(")
            .advice("keep the interval handle and clear it when the scene ends")
            .build()?,
        SignatureBuilder::new("eval-usage")
            .description("dynamic code evaluation with eval() or new Function()")
            .category(Category::Security)
            .severity(Severity::High)
            .matches(r"\beval\s*\(")
            .matches(r"\bnew\s+Function\s*\(")
            .advice("replace dynamic evaluation with plain functions")
            .build()?,
        SignatureBuilder::new("insecure-script-src")
            .description("external script loaded over plain http")
            .category(Category::Security)
            .severity(Severity::Medium)
            .scope(Scope::Document)
            .matches(r#"(?i)<script\b[^>]*\bsrc\s*=\s*["']?http://"#)
            .fix("upgrade-script-src")
            .advice("load external scripts over https")
            .build()?,
        SignatureBuilder::new("document-write")
            .description("document.write() can inject unescaped markup")
            .category(Category::Security)
            .severity(Severity::Medium)
            .matches(r"\bdocument\s*\.\s*write(?:ln)?\s*\(")
            .advice("build DOM nodes with createElement and textContent")
            .build()?,
        SignatureBuilder::new("missing-lang-attribute")
            .description("<html> element has no lang attribute")
            .category(Category::Accessibility)
            .severity(Severity::Low)
            .custom(move |ctx| {
                Ok(html_tag
                    .find(ctx.text.source())
                    .filter(|tag| !lang_attr.is_match(tag.as_str()))
                    .map(|tag| MatchHit::at(ctx.text.location(tag.start()))))
            })
            .fix("add-lang-attribute")
            .advice("declare the document language on <html>")
            .build()?,
        SignatureBuilder::new("missing-viewport-meta")
            .description("no viewport meta tag; layout will not adapt to small screens")
            .category(Category::Accessibility)
            .severity(Severity::Low)
            .scope(Scope::Document)
            .requires(r#"(?i)<meta\b[^>]*\bname\s*=\s*["']?viewport"#)
            .fix("add-viewport-meta")
            .advice("add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">")
            .build()?,
        SignatureBuilder::new("missing-doctype")
            .description("document has no <!DOCTYPE html> declaration")
            .category(Category::Syntax)
            .severity(Severity::Low)
            .scope(Scope::Document)
            .requires(r"(?i)^\s*<!doctype\s+html")
            .fix("add-doctype")
            .advice("start the document with <!DOCTYPE html>")
            .build()?,
    ])
}
