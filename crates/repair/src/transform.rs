//! Text transformations that fix individual finding kinds.
//!
//! Every transformation decides on its own whether the text still needs it,
//! so applying one to already fixed text changes nothing.

use artguard_core::{compile_pattern, ArtifactText, CompiledContract};
use regex::Regex;
use std::sync::Arc;

use crate::error::Result;

/// A named, idempotent fix.
pub trait Transformation: Send + Sync {
    /// Identifier recorded on repair attempts.
    fn id(&self) -> &str;

    /// Whether the text still has the problem this fixes.
    fn needs_fix(&self, text: &str) -> bool;

    /// Fixed text. Only called when [`needs_fix`](Self::needs_fix) is true.
    fn apply(&self, text: &str) -> String;
}

/// Default `(finding kind, transformation)` pairs.
pub fn default_transformations(
    contract: &CompiledContract,
) -> Result<Vec<(&'static str, Arc<dyn Transformation>)>> {
    Ok(vec![
        entry("missing-sdk-init", InsertSdkInit::new(contract)?),
        entry("unsafe-sensor-access", GuardSensorAccess::new(contract)),
        entry("unclosed-script-tag", CloseScriptTag::new()?),
        entry("unbalanced-braces", BalanceBraces),
        entry("insecure-script-src", UpgradeScriptSrc::new()?),
        entry("missing-lang-attribute", AddLangAttribute::new("en")?),
        entry("missing-viewport-meta", AddViewportMeta::new()?),
        entry("missing-doctype", AddDoctype::new()?),
    ])
}

fn entry<T: Transformation + 'static>(
    kind: &'static str,
    transformation: T,
) -> (&'static str, Arc<dyn Transformation>) {
    (kind, Arc::new(transformation))
}

fn insert_at(text: &str, offset: usize, insertion: &str) -> String {
    let mut out = String::with_capacity(text.len() + insertion.len());
    out.push_str(&text[..offset]);
    out.push_str(insertion);
    out.push_str(&text[offset..]);
    out
}

/// Inserts the SDK init call.
///
/// Goes at the top of the first inline script so it runs before any handler
/// registration; without an inline script a new one is added before
/// `</body>`, or at the end.
pub struct InsertSdkInit {
    init: Regex,
    snippet: String,
    body_close: Regex,
}

impl InsertSdkInit {
    /// Create for a contract.
    pub fn new(contract: &CompiledContract) -> Result<Self> {
        Ok(Self {
            init: contract.init.clone(),
            snippet: contract.contract.init_snippet(),
            body_close: compile_pattern(r"(?i)</body\s*>")?,
        })
    }
}

impl Transformation for InsertSdkInit {
    fn id(&self) -> &str {
        "insert-sdk-init"
    }

    fn needs_fix(&self, text: &str) -> bool {
        !self.init.is_match(ArtifactText::parse(text).code())
    }

    fn apply(&self, text: &str) -> String {
        let parsed = ArtifactText::parse(text);
        if let Some(script) = parsed.scripts().iter().find(|s| !s.external && s.closed) {
            return insert_at(text, script.open_tag.end, &format!("\n{}", self.snippet));
        }
        let element = format!("<script>{}</script>\n", self.snippet);
        match self.body_close.find(text) {
            Some(m) => insert_at(text, m.start(), &element),
            None => format!("{}\n{}", text.trim_end(), element),
        }
    }
}

/// Rewrites `x.orientation.beta` as `x?.orientation?.beta`.
pub struct GuardSensorAccess {
    sensor_access: Regex,
}

impl GuardSensorAccess {
    /// Create for a contract.
    pub fn new(contract: &CompiledContract) -> Self {
        Self {
            sensor_access: contract.sensor_access.clone(),
        }
    }
}

impl Transformation for GuardSensorAccess {
    fn id(&self) -> &str {
        "guard-sensor-access"
    }

    fn needs_fix(&self, text: &str) -> bool {
        self.sensor_access.is_match(ArtifactText::parse(text).code())
    }

    fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        // chained reads such as a.orientation.rotationRate.x need a second pass
        for _ in 0..4 {
            if !self.needs_fix(&current) {
                break;
            }
            current = ArtifactText::parse(&current)
                .rewrite_code_matches(&self.sensor_access, |caps| {
                    format!("{}?.{}?.{}", &caps[1], &caps[2], &caps[3])
                });
        }
        current
    }
}

/// Closes a `<script>` element left open.
pub struct CloseScriptTag {
    anchor: Regex,
}

impl CloseScriptTag {
    /// Create the transformation.
    pub fn new() -> Result<Self> {
        Ok(Self {
            anchor: compile_pattern(r"(?i)</body\s*>|</html\s*>")?,
        })
    }
}

impl Transformation for CloseScriptTag {
    fn id(&self) -> &str {
        "close-script-tag"
    }

    fn needs_fix(&self, text: &str) -> bool {
        let (opens, closes) = ArtifactText::parse(text).script_tag_counts();
        opens > closes
    }

    fn apply(&self, text: &str) -> String {
        let parsed = ArtifactText::parse(text);
        let after = parsed
            .scripts()
            .iter()
            .find(|s| !s.closed)
            .map_or(0, |s| s.open_tag.end);
        match self.anchor.find_at(text, after) {
            Some(m) => insert_at(text, m.start(), "</script>\n"),
            None => format!("{}\n</script>\n", text.trim_end()),
        }
    }
}

/// Appends missing closing braces at the end of each script.
///
/// Only handles missing closers; stray closers are left for a human.
pub struct BalanceBraces;

impl Transformation for BalanceBraces {
    fn id(&self) -> &str {
        "balance-braces"
    }

    fn needs_fix(&self, text: &str) -> bool {
        let parsed = ArtifactText::parse(text);
        let balance = parsed.balance('{', '}');
        balance.unclosed > 0 && balance.unexpected == 0
    }

    fn apply(&self, text: &str) -> String {
        let parsed = ArtifactText::parse(text);
        let mut out = text.to_string();
        for script in parsed.scripts().iter().rev() {
            let balance = parsed.block_balance(script, '{', '}');
            if balance.unclosed == 0 || balance.unexpected > 0 {
                continue;
            }
            let body = &text[script.body.clone()];
            let at = script.body.start + body.trim_end().len();
            let closers = format!("\n{}", "}".repeat(balance.unclosed));
            out = insert_at(&out, at, &closers);
        }
        out
    }
}

/// Loads external scripts over https.
pub struct UpgradeScriptSrc {
    insecure: Regex,
}

impl UpgradeScriptSrc {
    /// Create the transformation.
    pub fn new() -> Result<Self> {
        Ok(Self {
            insecure: compile_pattern(r#"(?i)(<script\b[^>]*\bsrc\s*=\s*["']?)http://"#)?,
        })
    }
}

impl Transformation for UpgradeScriptSrc {
    fn id(&self) -> &str {
        "upgrade-script-src"
    }

    fn needs_fix(&self, text: &str) -> bool {
        self.insecure.is_match(text)
    }

    fn apply(&self, text: &str) -> String {
        self.insecure.replace_all(text, "${1}https://").into_owned()
    }
}

/// Declares the document language.
pub struct AddLangAttribute {
    lang: String,
    html_tag: Regex,
    lang_attr: Regex,
}

impl AddLangAttribute {
    /// Create with the language to declare.
    pub fn new(lang: impl Into<String>) -> Result<Self> {
        Ok(Self {
            lang: lang.into(),
            html_tag: compile_pattern(r"(?i)<html\b[^>]*>")?,
            lang_attr: compile_pattern(r"(?i)\blang\s*=")?,
        })
    }
}

impl Transformation for AddLangAttribute {
    fn id(&self) -> &str {
        "add-lang-attribute"
    }

    fn needs_fix(&self, text: &str) -> bool {
        self.html_tag
            .find(text)
            .map_or(false, |tag| !self.lang_attr.is_match(tag.as_str()))
    }

    fn apply(&self, text: &str) -> String {
        match self.html_tag.find(text) {
            Some(tag) => insert_at(text, tag.start() + "<html".len(), &format!(" lang=\"{}\"", self.lang)),
            None => text.to_string(),
        }
    }
}

/// Adds a responsive viewport declaration.
pub struct AddViewportMeta {
    viewport: Regex,
    head: Regex,
    html: Regex,
    doctype: Regex,
}

const VIEWPORT_META: &str = r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#;

impl AddViewportMeta {
    /// Create the transformation.
    pub fn new() -> Result<Self> {
        Ok(Self {
            viewport: compile_pattern(r#"(?i)<meta\b[^>]*\bname\s*=\s*["']?viewport"#)?,
            head: compile_pattern(r"(?i)<head\b[^>]*>")?,
            html: compile_pattern(r"(?i)<html\b[^>]*>")?,
            doctype: compile_pattern(r"(?i)^\s*<!doctype[^>]*>")?,
        })
    }
}

impl Transformation for AddViewportMeta {
    fn id(&self) -> &str {
        "add-viewport-meta"
    }

    fn needs_fix(&self, text: &str) -> bool {
        !self.viewport.is_match(text)
    }

    fn apply(&self, text: &str) -> String {
        if let Some(head) = self.head.find(text) {
            return insert_at(text, head.end(), &format!("\n{}", VIEWPORT_META));
        }
        if let Some(html) = self.html.find(text) {
            return insert_at(text, html.end(), &format!("\n<head>{}</head>", VIEWPORT_META));
        }
        let at = self.doctype.find(text).map_or(0, |m| m.end());
        insert_at(text, at, &format!("\n{}\n", VIEWPORT_META))
    }
}

/// Prepends the HTML5 doctype.
pub struct AddDoctype {
    doctype: Regex,
}

impl AddDoctype {
    /// Create the transformation.
    pub fn new() -> Result<Self> {
        Ok(Self {
            doctype: compile_pattern(r"(?i)^\s*<!doctype\s+html")?,
        })
    }
}

impl Transformation for AddDoctype {
    fn id(&self) -> &str {
        "add-doctype"
    }

    fn needs_fix(&self, text: &str) -> bool {
        !self.doctype.is_match(text)
    }

    fn apply(&self, text: &str) -> String {
        format!("<!DOCTYPE html>\n{}", text.trim_start())
    }
}
