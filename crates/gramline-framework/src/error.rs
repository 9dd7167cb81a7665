//! Error types for the Gramline framework.

use thiserror::Error;

/// Errors raised while setting up a collector.
#[derive(Debug, Clone, Error)]
pub enum CollectorError {
    /// An option value is out of range.
    #[error("invalid collector option '{option}': {reason}")]
    InvalidOption {
        /// Option name.
        option: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Collectors schedule timers and must be started inside a tokio runtime.
    #[error("collector started outside a tokio runtime")]
    NoRuntime,
}

impl CollectorError {
    pub(crate) fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            reason: reason.into(),
        }
    }
}

/// Result type for collector setup.
pub type CollectorResult<T> = Result<T, CollectorError>;
