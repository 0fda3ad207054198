//! Pattern library errors.

use artguard_core::GuardError;

/// Errors raised while defining signatures.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// The signature definition is incomplete or inconsistent
    #[error("invalid signature '{kind}': {reason}")]
    InvalidSignature {
        /// Signature kind
        kind: String,
        /// What is wrong with it
        reason: String,
    },

    /// A signature with the same kind is already registered
    #[error("signature '{0}' is already registered")]
    DuplicateSignature(String),

    /// Core error (pattern compilation)
    #[error(transparent)]
    Core(#[from] GuardError),
}

/// Result type for pattern operations.
pub type Result<T> = std::result::Result<T, PatternError>;
