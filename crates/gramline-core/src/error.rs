//! Unified error types for the Gramline core.
//!
//! Collector errors live in `gramline-framework`; runtime and configuration
//! errors live in `gramline-runtime`.

use std::time::Duration;

use thiserror::Error;

use crate::model::ResponseParameters;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised below the API envelope: network, HTTP and body encoding.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status and no usable envelope.
    #[error("HTTP {status} error: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body was not a valid API envelope.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A media source for an upload could not be read or fetched.
    #[error("failed to load media for field '{field}': {reason}")]
    Media {
        /// The parameter field that referenced the media.
        field: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid transport configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl TransportError {
    /// Returns `true` if retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Media { .. } | Self::InvalidConfig(_) => false,
        }
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The API envelope reported `ok: false`.
    #[error("{method} failed ({code}): {description}")]
    Api {
        /// The API method that was called.
        method: String,
        /// The envelope's `error_code`.
        code: i64,
        /// The envelope's `description`, unchanged.
        description: String,
        /// Extra hints such as `retry_after`.
        parameters: Option<ResponseParameters>,
    },

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The update does not carry an id the action needs.
    #[error("update has no {0}")]
    MissingContext(&'static str),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ApiError {
    /// Returns the retry hint carried by the error envelope, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api {
                parameters: Some(p),
                ..
            } => p.retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    /// Returns the envelope error code, if this is an envelope error.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if the error cannot be fixed by retrying.
    ///
    /// Rate limits, server-side (5xx) failures and transient transport
    /// failures are recoverable; every other envelope error (bad token,
    /// conflicting consumer, malformed request) is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Api { code, .. } => {
                self.retry_after().is_none() && *code != 429 && *code < 500
            }
            Self::Transport(e) => !e.is_transient(),
            Self::Serialization(_) => false,
            Self::MissingContext(_) => true,
        }
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors raised while decoding a raw update.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The update is not a JSON object.
    #[error("update is not a JSON object")]
    NotAnObject,

    /// The update has no integer `update_id`.
    #[error("update has no integer update_id")]
    MissingUpdateId,

    /// None of the known variant fields is populated.
    #[error("update {update_id} has no known variant field")]
    UnknownVariant {
        /// The update's id.
        update_id: i64,
    },

    /// The variant payload does not match its expected shape.
    #[error("update {update_id}: invalid '{field}' payload: {reason}")]
    Payload {
        /// The update's id.
        update_id: i64,
        /// The variant field name.
        field: &'static str,
        /// Reason for failure.
        reason: String,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: i64, retry_after: Option<u64>) -> ApiError {
        ApiError::Api {
            method: "getUpdates".into(),
            code,
            description: "Too Many Requests: retry after 3".into(),
            parameters: Some(ResponseParameters {
                retry_after,
                migrate_to_chat_id: None,
            }),
        }
    }

    #[test]
    fn test_message_includes_method_and_description() {
        let err = api_error(429, Some(3));
        let text = err.to_string();
        assert!(text.contains("getUpdates"));
        assert!(text.contains("Too Many Requests: retry after 3"));
    }

    #[test]
    fn test_rate_limit_is_recoverable() {
        let err = api_error(429, Some(3));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unauthorized_is_fatal() {
        let err = api_error(401, None);
        assert!(err.is_fatal());
        assert_eq!(err.code(), Some(401));
    }

    #[test]
    fn test_server_errors_are_recoverable() {
        assert!(!api_error(502, None).is_fatal());
        assert!(!api_error(429, None).is_fatal());
        assert!(!ApiError::Transport(TransportError::Http("reset".into())).is_fatal());
        assert!(ApiError::Transport(TransportError::Decode("junk".into())).is_fatal());
    }
}
