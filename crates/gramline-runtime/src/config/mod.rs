//! Configuration for the Gramline runtime.
//!
//! Layered loading (defaults, files, environment) through figment, plus
//! validation of the loaded values.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BackoffConfig, BotConfig, GramlineConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, PollingConfig, SpanEventConfig,
};
pub use validation::validate_config;
