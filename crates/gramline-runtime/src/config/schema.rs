//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! token = "123456:ABC-DEF"
//! timeout_ms = 60000
//!
//! [polling]
//! limit = 100
//! timeout_secs = 30
//! allowed_updates = ["message", "callback_query"]
//!
//! [polling.backoff]
//! initial_delay_ms = 1000
//! max_delay_ms = 60000
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gramline_transport::{DEFAULT_API_BASE, HttpTransportConfig, mask_token};

use crate::backoff::Backoff;
use crate::polling::PollingOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GramlineConfig {
    /// Credentials and HTTP settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Long-polling settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot credentials and transport settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot token issued by the platform (`<id>:<secret>`).
    #[serde(default)]
    pub token: String,

    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Request timeout in milliseconds. Must exceed the long-poll timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Timeout for fetching remote media before an upload, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub media_timeout_ms: u64,

    /// Proxy URL for all requests.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_api_base(),
            timeout_ms: default_timeout_ms(),
            media_timeout_ms: default_timeout_ms(),
            proxy: None,
        }
    }
}

impl BotConfig {
    /// Converts to the HTTP transport configuration.
    pub fn to_transport_config(&self) -> HttpTransportConfig {
        let config = HttpTransportConfig::new(self.token.clone())
            .with_api_base(self.api_base.clone())
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_media_timeout(Duration::from_millis(self.media_timeout_ms));
        match &self.proxy {
            Some(proxy) => config.with_proxy(proxy.clone()),
            None => config,
        }
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &mask_token(&self.token))
            .field("api_base", &self.api_base)
            .field("timeout_ms", &self.timeout_ms)
            .field("media_timeout_ms", &self.media_timeout_ms)
            .field("proxy", &self.proxy)
            .finish()
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_ms() -> u64 {
    60000
}

// =============================================================================
// Polling
// =============================================================================

/// Long-polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Maximum updates per batch (1..=100).
    #[serde(default = "default_limit")]
    pub limit: u8,

    /// Long-poll timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,

    /// Update kinds to receive. Empty keeps the platform's default.
    #[serde(default)]
    pub allowed_updates: Vec<String>,

    /// Skip updates that arrived while the bot was offline.
    #[serde(default)]
    pub drop_pending_updates: bool,

    /// Retry delays after failed polls.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            timeout_secs: default_timeout_secs(),
            allowed_updates: Vec::new(),
            drop_pending_updates: false,
            backoff: BackoffConfig::default(),
        }
    }
}

impl PollingConfig {
    /// Converts to polling loop options.
    pub fn to_options(&self) -> PollingOptions {
        PollingOptions {
            limit: self.limit,
            timeout: self.timeout_secs,
            allowed_updates: self.allowed_updates.clone(),
            drop_pending_updates: self.drop_pending_updates,
            backoff: self.backoff.to_backoff(),
        }
    }
}

fn default_limit() -> u8 {
    100
}

fn default_timeout_secs() -> u32 {
    30
}

/// Retry delay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Random extra delay, as a fraction of the base delay (0.0..=1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    /// Converts to the polling loop's backoff policy.
    pub fn to_backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.initial_delay_ms),
            max: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-target levels, e.g. `gramline_transport = "trace"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}
