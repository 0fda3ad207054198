//! Repair errors.

/// Errors raised while setting up the repair engine.
///
/// Failed fixes are never errors; they are reported as failed
/// [`RepairAttempt`](artguard_core::RepairAttempt)s.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Pattern compilation failed
    #[error(transparent)]
    Core(#[from] artguard_core::GuardError),

    /// Signature library setup failed
    #[error(transparent)]
    Pattern(#[from] artguard_detect::PatternError),
}

/// Result type for repair setup.
pub type Result<T> = std::result::Result<T, RepairError>;
