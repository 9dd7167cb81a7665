//! Runtime error types.

use thiserror::Error;

use gramline_core::{ApiError, TransportError};
use gramline_framework::CollectorError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be built.
    #[error("Failed to build transport: {0}")]
    Transport(#[from] TransportError),

    /// An API call failed; for the polling loop this is the fatal error
    /// that stopped it.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Collector construction failed.
    #[error(transparent)]
    Collector(#[from] CollectorError),

    /// Polling options are out of range.
    #[error("Invalid polling option '{option}': {reason}")]
    InvalidPolling {
        option: &'static str,
        reason: String,
    },

    /// `run` was called while the client is already polling.
    #[error("Client is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
