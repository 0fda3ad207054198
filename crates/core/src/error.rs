//! Core error type.

/// Errors raised by the core model.
///
/// Analysis problems found in artifacts are never errors; they are reported
/// as findings. These cover invalid configuration and arguments only.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// A configured pattern did not compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Compiler error
        #[source]
        source: regex::Error,
    },

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Compile a regex, mapping the failure into [`GuardError::InvalidPattern`].
pub fn compile_pattern(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| GuardError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_pattern_error() {
        let err = compile_pattern("(unclosed").unwrap_err();
        assert!(err.to_string().starts_with("invalid pattern '(unclosed'"));
        assert!(compile_pattern(r"\bok\b").is_ok());
    }
}
