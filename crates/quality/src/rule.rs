//! Rule abstraction.

use artguard_core::{ArtifactText, Category, CompiledContract, Finding};

use crate::error::Result;

/// Everything a rule may look at.
pub struct RuleContext<'a> {
    /// Parsed artifact
    pub text: &'a ArtifactText<'a>,

    /// Content type tag
    pub type_tag: &'a str,

    /// SDK contract the artifact must honour
    pub contract: &'a CompiledContract,
}

/// A check contributing findings to one category.
///
/// Returning `Err` (or panicking) does not abort validation; the validator
/// turns it into an `analysis-error` finding for the rule's category.
pub trait CategoryCheck: Send + Sync {
    /// Unique rule name.
    fn name(&self) -> &str;

    /// Category the findings are scored under.
    fn category(&self) -> Category;

    /// Run the rule.
    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>>;
}

type RuleFn = dyn Fn(&RuleContext<'_>) -> Result<Vec<Finding>> + Send + Sync;

/// Rule backed by a closure.
pub struct FnRule {
    name: String,
    category: Category,
    check: Box<RuleFn>,
}

impl FnRule {
    /// Create a rule from a closure.
    pub fn new<F>(name: impl Into<String>, category: Category, check: F) -> Self
    where
        F: Fn(&RuleContext<'_>) -> Result<Vec<Finding>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            category,
            check: Box::new(check),
        }
    }
}

impl std::fmt::Debug for FnRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRule")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

impl CategoryCheck for FnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        (self.check)(ctx)
    }
}
