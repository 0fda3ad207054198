//! Monitor errors.

use artguard_core::ArtifactId;

/// Errors raised by the monitor.
///
/// Artifact-level analysis problems never show up here; they are findings,
/// failed repair attempts or skipped checks.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No artifact is registered under the id
    #[error("artifact not found: {0}")]
    UnknownArtifact(ArtifactId),

    /// Contract compilation failed
    #[error(transparent)]
    Core(#[from] artguard_core::GuardError),

    /// Rule catalog setup failed
    #[error(transparent)]
    Quality(#[from] artguard_quality::QualityError),

    /// Signature library setup failed
    #[error(transparent)]
    Pattern(#[from] artguard_detect::PatternError),

    /// Repair engine setup failed
    #[error(transparent)]
    Repair(#[from] artguard_repair::RepairError),

    /// Webhook request failed
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),

    /// Webhook answered with an error status
    #[error("webhook returned status {status}: {body}")]
    WebhookStatus {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
