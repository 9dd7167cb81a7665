//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The file extension has no enabled format feature.
    #[error("config file {} has an unsupported extension (enable `toml-config` or `yaml-config`)", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The merged sources do not fit [`GramlineConfig`](super::GramlineConfig).
    #[error("malformed configuration: {0}")]
    Malformed(String),

    #[error("`{field}` is required")]
    MissingField { field: &'static str },

    #[error("`{field}` is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("`{field}` is not a usable URL ({url:?}): {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: &'static str,
    },
}

impl ConfigError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    pub fn bad_url(field: &'static str, url: &str, reason: &'static str) -> Self {
        Self::InvalidUrl {
            field,
            url: url.to_string(),
            reason,
        }
    }

    /// The dotted config key the error is about, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field }
            | Self::InvalidValue { field, .. }
            | Self::InvalidUrl { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
