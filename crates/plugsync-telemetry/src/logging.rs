//! Logging configuration and setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, MakeWriter, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// Single-line output.
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Log output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stdout.
    Stdout,
    /// Log to stderr.
    #[default]
    Stderr,
    /// Log to daily-rotated files in this directory.
    File(PathBuf),
}

/// How `plugsyncd` and the library crates emit tracing events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter, e.g. `info` or `plugsync_meta=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Where events go.
    pub target: LogTarget,
    /// File name prefix for [`LogTarget::File`].
    pub file_prefix: String,
    /// Colorize terminal output.
    pub ansi: bool,
    /// Appended to `level`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            target: LogTarget::Stderr,
            file_prefix: "plugsync".to_string(),
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Log at `level` to stderr.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Use `format`.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Write to `target`.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Write daily-rotated files named `<prefix>.<date>` under `dir`.
    /// Colors are turned off.
    #[must_use]
    pub fn with_file_logging(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.target = LogTarget::File(dir.into());
        self.file_prefix = prefix.into();
        self.ansi = false;
        self
    }

    /// Add a per-target filter such as `plugsync_acquire=trace`.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for raw in &self.directives {
            let directive = raw
                .parse()
                .map_err(|e: ParseError| TelemetryError::ConfigError(format!("{raw}: {e}")))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        // Spans close around whole downloads and reconciles; log their timing.
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        }
    }
}

/// Install the global tracing subscriber described by `config`.
///
/// # Errors
///
/// Fails on an invalid filter, an uncreatable log directory, or when a
/// global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let layer = match &config.target {
        LogTarget::Stdout => config.layer(std::io::stdout),
        LogTarget::Stderr => config.layer(std::io::stderr),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, &config.file_prefix);
            config.layer(appender)
        },
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(config.filter()?))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

#[cfg(feature = "config")]
impl From<&plugsync_config::LoggingSection> for LogConfig {
    fn from(section: &plugsync_config::LoggingSection) -> Self {
        let format = match section.format.as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };
        let mut config = Self::new(section.level.clone()).with_format(format);
        config.directives.clone_from(&section.directives);
        if let Some(dir) = &section.directory {
            config = config.with_file_logging(dir.clone(), "plugsync");
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_go_to_stderr() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.target, LogTarget::Stderr);
        assert!(config.ansi);
    }

    #[test]
    fn file_target_turns_colors_off() {
        let config = LogConfig::new("debug").with_file_logging("/var/log/plugsync", "node-a");
        assert_eq!(config.target, LogTarget::File(PathBuf::from("/var/log/plugsync")));
        assert_eq!(config.file_prefix, "node-a");
        assert!(!config.ansi);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let parsed: LogConfig = serde_json::from_str(r#"{"level":"trace","format":"json"}"#).unwrap();
        assert_eq!(parsed.level, "trace");
        assert_eq!(parsed.format, LogFormat::Json);
        assert_eq!(parsed.file_prefix, "plugsync");
    }

    #[test]
    fn bad_directive_is_a_config_error() {
        let ok = LogConfig::new("info").with_directive("plugsync_meta=trace");
        assert!(ok.filter().is_ok());

        let bad = LogConfig::new("info").with_directive("[plugsync=");
        assert!(matches!(bad.filter(), Err(TelemetryError::ConfigError(_))));
    }

    #[cfg(feature = "config")]
    #[test]
    fn section_with_directory_logs_to_files() {
        let section = plugsync_config::LoggingSection {
            level: "warn".to_string(),
            format: "compact".to_string(),
            directives: vec!["plugsync_install=debug".to_string()],
            directory: Some(PathBuf::from("/tmp/plugsync-logs")),
        };
        let config = LogConfig::from(&section);
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.directives, vec!["plugsync_install=debug"]);
        assert_eq!(config.target, LogTarget::File(PathBuf::from("/tmp/plugsync-logs")));
    }
}
