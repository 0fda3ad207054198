//! Rule catalog.

use artguard_core::Category;
use artguard_detect::PatternLibrary;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::builtin;
use crate::error::{QualityError, Result};
use crate::rule::CategoryCheck;

/// Registry of validation rules grouped by category.
#[derive(Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<Arc<dyn CategoryCheck>>,
    by_category: BTreeMap<Category, Vec<usize>>,
}

impl RuleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog scoring the library's signatures plus the validator-only
    /// built-in rules.
    pub fn builtin(library: &PatternLibrary) -> Result<Self> {
        let mut catalog = Self::new();
        for rule in builtin::rules(library)? {
            catalog.register(rule)?;
        }
        Ok(catalog)
    }

    /// Register a rule. Names must be unique.
    pub fn register(&mut self, rule: Arc<dyn CategoryCheck>) -> Result<()> {
        if self.get(rule.name()).is_some() {
            return Err(QualityError::DuplicateRule(rule.name().to_string()));
        }
        self.rules.push(rule);
        self.reindex();
        Ok(())
    }

    /// Remove a rule by name.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn CategoryCheck>> {
        let pos = self.rules.iter().position(|r| r.name() == name)?;
        let rule = self.rules.remove(pos);
        self.reindex();
        Some(rule)
    }

    /// Get a rule by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CategoryCheck>> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// All rules in registration order.
    pub fn list(&self) -> &[Arc<dyn CategoryCheck>] {
        &self.rules
    }

    /// Rules of one category.
    pub fn find_by_category(&self, category: Category) -> Vec<&Arc<dyn CategoryCheck>> {
        self.by_category
            .get(&category)
            .into_iter()
            .flat_map(|idx| idx.iter().filter_map(|&i| self.rules.get(i)))
            .collect()
    }

    /// Categories with at least one rule.
    pub fn categories(&self) -> Vec<Category> {
        self.by_category.keys().copied().collect()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the catalog has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn reindex(&mut self) {
        self.by_category.clear();
        for (i, rule) in self.rules.iter().enumerate() {
            self.by_category.entry(rule.category()).or_default().push(i);
        }
    }
}

impl std::fmt::Debug for RuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("RuleCatalog").field("rules", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::FnRule;

    fn rule(name: &str, category: Category) -> Arc<dyn CategoryCheck> {
        Arc::new(FnRule::new(name, category, |_| Ok(Vec::new())))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = RuleCatalog::new();
        catalog.register(rule("a", Category::Syntax)).unwrap();
        catalog.register(rule("b", Category::Security)).unwrap();
        catalog.register(rule("c", Category::Syntax)).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.find_by_category(Category::Syntax).len(), 2);
        assert_eq!(catalog.categories(), vec![Category::Syntax, Category::Security]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut catalog = RuleCatalog::new();
        catalog.register(rule("a", Category::Syntax)).unwrap();
        let err = catalog.register(rule("a", Category::Security)).unwrap_err();
        assert!(matches!(err, QualityError::DuplicateRule(name) if name == "a"));
    }

    #[test]
    fn test_unregister_reindexes() {
        let mut catalog = RuleCatalog::new();
        catalog.register(rule("a", Category::Syntax)).unwrap();
        catalog.register(rule("b", Category::Security)).unwrap();
        assert!(catalog.unregister("a").is_some());
        assert!(catalog.unregister("a").is_none());
        assert_eq!(catalog.categories(), vec![Category::Security]);
        assert_eq!(catalog.find_by_category(Category::Security)[0].name(), "b");
    }

    #[test]
    fn test_builtin_covers_every_category() {
        let contract = artguard_core::CompiledContract::default_contract().unwrap();
        let library = PatternLibrary::with_defaults(&contract).unwrap();
        let catalog = RuleCatalog::builtin(&library).unwrap();
        assert_eq!(catalog.categories(), Category::ALL.to_vec());
        assert!(catalog.get("signatures/syntax").is_some());

        let bare = RuleCatalog::builtin(&PatternLibrary::new()).unwrap();
        assert!(bare.get("signatures/syntax").is_none());
        assert_eq!(bare.len(), catalog.len() - Category::ALL.len());
    }
}
