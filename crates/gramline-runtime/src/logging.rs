//! Logging setup over `tracing-subscriber`.
//!
//! From a loaded configuration:
//!
//! ```rust,ignore
//! use gramline_runtime::{config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//! ```
//!
//! By hand:
//!
//! ```rust,ignore
//! use gramline_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("gramline_transport=trace")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level; directives are
//! added on top of either.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Which span lifecycle events are logged.
///
/// The router opens one `route` span per update, so [`SpanEvents::LIFECYCLE`]
/// shows when each update's dispatch starts and ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Creation and close only.
    pub const LIFECYCLE: Self = Self {
        new: true,
        close: true,
        ..Self::NONE
    };

    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(FmtSpan::NONE, |acc, (_, kind)| acc | kind)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// Installs the global subscriber described by `config`, unless one is
/// already installed.
pub fn init_from_config(config: &LoggingConfig) {
    LoggingBuilder::from_config(config).init();
}

// =============================================================================
// LoggingBuilder
// =============================================================================

/// Assembles the global tracing subscriber.
#[derive(Debug)]
pub struct LoggingBuilder {
    level: tracing::Level,
    directives: Vec<String>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    target: bool,
    thread_ids: bool,
    location: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact `info` lines on stdout.
    pub fn new() -> Self {
        Self {
            level: tracing::Level::INFO,
            directives: Vec::new(),
            span_events: SpanEvents::NONE,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            target: true,
            thread_ids: false,
            location: false,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.to_tracing_level(),
            directives: config
                .filters
                .iter()
                .map(|(target, level)| format!("{target}={level}"))
                .collect(),
            span_events: SpanEvents::from(&config.span_events),
            format: config.format,
            output: config.output,
            file_path: config.file_path.clone(),
            rotation: config.rotation,
            thread_ids: config.thread_ids,
            location: config.file_location,
            ..Self::new()
        }
    }

    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Adds a filter directive such as `gramline_runtime=debug`. Directives
    /// that do not parse are skipped.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Logs to `path`, rotated per `rotation`.
    pub fn file(mut self, path: impl Into<PathBuf>, rotation: LogRotation) -> Self {
        self.output = LogOutput::File;
        self.file_path = Some(path.into());
        self.rotation = rotation;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Adds source file and line to every event.
    pub fn with_file_location(mut self, enabled: bool) -> Self {
        self.location = enabled;
        self
    }

    /// `RUST_LOG` if set, else the base level; directives on top.
    fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()));
        self.directives
            .iter()
            .filter_map(|directive| directive.parse().ok())
            .fold(base, EnvFilter::add_directive)
    }

    fn rolling_appender(&self, path: &Path) -> RollingFileAppender {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let name = path.file_name().unwrap_or(OsStr::new("gramline.log"));
        match self.rotation {
            LogRotation::Never => rolling::never(dir, name),
            LogRotation::Hourly => rolling::hourly(dir, name),
            LogRotation::Daily => rolling::daily(dir, name),
        }
    }

    /// The writer and, when the request could not be honoured, why.
    fn writer(&self) -> (BoxMakeWriter, Option<&'static str>) {
        match (self.output, self.file_path.as_deref()) {
            (LogOutput::Stdout, _) => (BoxMakeWriter::new(std::io::stdout), None),
            (LogOutput::Stderr, _) => (BoxMakeWriter::new(std::io::stderr), None),
            (LogOutput::File, Some(path)) => {
                (BoxMakeWriter::new(self.rolling_appender(path)), None)
            }
            (LogOutput::File, None) => (
                BoxMakeWriter::new(std::io::stdout),
                Some("file output has no path, logging to stdout"),
            ),
        }
    }

    fn fmt_layer(&self, writer: BoxMakeWriter) -> (BoxedLayer, Option<&'static str>) {
        let span_events = self.span_events.to_fmt_span();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_writer(writer)
                    .with_span_events(span_events)
                    .with_target(self.target)
                    .with_thread_ids(self.thread_ids)
                    .with_file(self.location)
                    .with_line_number(self.location)
                    .boxed()
            };
        }

        match self.format {
            #[cfg(feature = "json-log")]
            LogFormat::Json => (configure_layer!(fmt::layer().json()), None),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => (
                configure_layer!(fmt::layer().compact()),
                Some("JSON logs need the `json-log` feature, using compact lines"),
            ),
            LogFormat::Compact => (configure_layer!(fmt::layer().compact()), None),
            LogFormat::Full => (configure_layer!(fmt::layer()), None),
            LogFormat::Pretty => (configure_layer!(fmt::layer().pretty()), None),
        }
    }

    /// Installs the subscriber; a no-op if one is already installed.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    ///
    /// # Errors
    /// Fails if a global subscriber is already installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let (writer, output_note) = self.writer();
        let (layer, format_note) = self.fmt_layer(writer);

        tracing_subscriber::registry()
            .with(layer)
            .with(self.env_filter())
            .try_init()?;

        for note in [output_note, format_note].into_iter().flatten() {
            warn!("{note}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_from_config() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            thread_ids: true,
            file_location: true,
            ..Default::default()
        };
        config.filters.insert("gramline_transport".into(), LogLevel::Trace);
        config.span_events.new = true;
        config.span_events.close = true;

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, tracing::Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert_eq!(builder.span_events, SpanEvents::LIFECYCLE);
        assert!(builder.thread_ids && builder.location);
        assert!(builder.target);
        assert_eq!(builder.directives, vec!["gramline_transport=trace"]);
    }

    #[test]
    fn test_file_sets_output() {
        let builder = LoggingBuilder::new().file("logs/bot.log", LogRotation::Daily);
        assert_eq!(builder.output, LogOutput::File);
        assert_eq!(builder.rotation, LogRotation::Daily);
        assert_eq!(builder.file_path.as_deref(), Some(Path::new("logs/bot.log")));
    }
}
