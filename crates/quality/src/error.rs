//! Quality errors.

use artguard_core::GuardError;
use artguard_detect::PatternError;

/// Errors raised while building or running the rule catalog.
#[derive(Debug, thiserror::Error)]
pub enum QualityError {
    /// A rule with the same name is already registered
    #[error("rule '{0}' is already registered")]
    DuplicateRule(String),

    /// A rule could not finish its analysis
    #[error("{0}")]
    Analysis(String),

    /// Core error (pattern compilation)
    #[error(transparent)]
    Core(#[from] GuardError),

    /// The signature library could not be built
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Result type for quality operations.
pub type Result<T> = std::result::Result<T, QualityError>;
