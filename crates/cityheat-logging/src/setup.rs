//! ---
//! cityheat_section: "03-logging"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Structured logging adapters and subscriber bootstrap."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "CITYHEAT_LOG";

/// Crates whose events belong in the run log file.
const RUN_LOG_TARGETS: &[&str] = &["cityheat_balance", "cityheat_logging", "cityheatctl"];

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static CONSOLE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Output format for the console layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    StructuredJson,
    /// Human-readable multi-field lines.
    Pretty,
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_file_level() -> String {
    "debug".to_owned()
}

/// Logging section of the application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Directory receiving the daily rolling run logs.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Format used on the console.
    #[serde(default)]
    pub format: LogFormat,
    /// Optional file name prefix, defaults to the service name.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Most verbose level of balancing events written to the run log.
    #[serde(default = "default_file_level")]
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: LogFormat::default(),
            file_prefix: None,
            file_level: default_file_level(),
        }
    }
}

impl LoggingConfig {
    fn run_log_targets(&self) -> Result<Targets> {
        let level: Level = self
            .file_level
            .parse()
            .with_context(|| format!("invalid run log level `{}`", self.file_level))?;
        Ok(RUN_LOG_TARGETS
            .iter()
            .fold(Targets::new(), |targets, target| targets.with_target(*target, level))
            .with_default(Level::WARN))
    }
}

/// Console filter: `CITYHEAT_LOG`, then `RUST_LOG`, then `info`.
pub(crate) fn console_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to info logging",
                LOG_ENV, err
            );
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Initialize the tracing subscriber from configuration and environment variables.
///
/// Console events go to stderr, so stdout stays free for command output, and are
/// filtered by `CITYHEAT_LOG`, then `RUST_LOG`, then `info`. The daily rolling JSON run log under
/// `config.directory` keeps the cityheat crates' events down to `file_level`
/// regardless of the console filter, plus warnings from everything else.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let run_log_targets = config.run_log_targets()?;
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&config.directory, format!("{}.log", prefix));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());

    let _ = FILE_GUARD.set(file_guard);
    let _ = CONSOLE_GUARD.set(console_guard);

    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(console_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .flatten_event(true)
        .with_writer(file_writer)
        .with_filter(run_log_targets);

    tracing_subscriber::registry()
        .with(console_layer.with_filter(console_filter()))
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        file_level = %config.file_level,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.directory, PathBuf::from("target/logs"));
        assert_eq!(config.format, LogFormat::StructuredJson);
        assert!(config.file_prefix.is_none());
        assert_eq!(config.file_level, "debug");
    }

    #[test]
    fn run_log_level_is_validated() {
        let config = LoggingConfig {
            file_level: "chatty".into(),
            ..LoggingConfig::default()
        };
        let err = init_tracing("cityheat-test", &config).unwrap_err();
        assert!(err.to_string().contains("chatty"), "{err}");

        let targets = LoggingConfig {
            file_level: "trace".into(),
            ..LoggingConfig::default()
        }
        .run_log_targets()
        .unwrap();
        assert!(targets.would_enable("cityheat_balance::allocation", &Level::TRACE));
        assert!(!targets.would_enable("petgraph", &Level::INFO));
        assert!(targets.would_enable("petgraph", &Level::WARN));
    }

    #[test]
    fn init_tracing_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("test".into()),
            ..LoggingConfig::default()
        };
        init_tracing("cityheat-test", &config).unwrap();
        assert!(config.directory.is_dir());
    }
}
