//! Metrics errors.

use artguard_core::MetricToken;

/// Errors raised by the metrics aggregator.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The token was never issued or was already completed
    #[error("unknown metrics token: {0}")]
    UnknownToken(MetricToken),
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
