//! Logging setup with optional daily-rotated log files
//!
//! Configured from the environment:
//! - `RUST_LOG`: filter directives, e.g. `instrument_status_server=debug`
//! - `STATUS_SERVER_LOG_FILE`: path of the log file, rotated daily
//! - `STATUS_SERVER_LOG_STDERR`: `false` disables stderr output
//! - `STATUS_SERVER_LOG_JSON`: `true` switches to JSON lines

use crate::error::{Result, StatusServerError};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` names none
    pub level: Level,

    /// Log to file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Include thread names and ids; poll tasks run on the worker pool
    pub thread_ids: bool,

    /// JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            thread_ids: false,
            json: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            config.level = level_hint(&rust_log).unwrap_or(config.level);
        }

        if let Ok(log_file) = std::env::var("STATUS_SERVER_LOG_FILE") {
            config.file_path = Some(PathBuf::from(log_file));
        }

        if let Ok(log_stderr) = std::env::var("STATUS_SERVER_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(json) = std::env::var("STATUS_SERVER_LOG_JSON") {
            config.json = json.to_lowercase() == "true";
        }

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_thread_ids(mut self, thread_ids: bool) -> Self {
        self.thread_ids = thread_ids;
        self
    }
}

/// Most verbose level mentioned in a `RUST_LOG` value
fn level_hint(directives: &str) -> Option<Level> {
    let directives = directives.to_lowercase();
    [
        ("trace", Level::TRACE),
        ("debug", Level::DEBUG),
        ("info", Level::INFO),
        ("warn", Level::WARN),
        ("error", Level::ERROR),
    ]
    .into_iter()
    .find(|(name, _)| directives.contains(name))
    .map(|(_, level)| level)
}

fn output_layer<W>(writer: W, ansi: bool, config: &LogConfig) -> BoxedLayer
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_names(config.thread_ids)
        .with_thread_ids(config.thread_ids);
    if config.json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.stderr {
        layers.push(output_layer(std::io::stderr, !config.json, &config));
    }
    if let Some(file_path) = &config.file_path {
        let directory = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory)?;

        let file_appender = tracing_appender::rolling::daily(
            directory,
            file_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("status-server.log")),
        );
        layers.push(output_layer(file_appender, false, &config));
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| StatusServerError::config(format!("Logging already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("debug", Some(Level::DEBUG))]
    #[case("warn,instrument_status_server=trace", Some(Level::TRACE))]
    #[case("INFO", Some(Level::INFO))]
    #[case("off", None)]
    fn test_level_hint(#[case] directives: &str, #[case] expected: Option<Level>) {
        assert_eq!(level_hint(directives), expected);
    }

    #[test]
    fn test_defaults() {
        let config = LogConfig::default().with_level(Level::DEBUG).with_thread_ids(true);
        assert!(config.stderr);
        assert!(config.file_path.is_none());
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.thread_ids);
    }
}
