//! Tracing subscriber setup.
//!
//! ```ignore
//! let mut log_config = LogConfig::from_env("info").with_stderr();
//! if verbose {
//!     log_config = log_config.with_level("debug");
//! }
//! let _guards = init_logging(&log_config)?;
//! ```

use crate::config::EnvParser;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("invalid log file path: {0}")]
    FilePath(PathBuf),

    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, one event per line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `faultline_common=debug`.
    pub level: String,
    pub format: LogFormat,
    pub stderr: bool,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            stderr: false,
            file: None,
        }
    }

    /// Read `FAULTLINE_LOG`, `FAULTLINE_LOG_FORMAT` and `FAULTLINE_LOG_FILE`.
    ///
    /// Invalid values fall back to the defaults; logging is not yet up to
    /// report them.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let level = parser.get_string("LOG", default_level).value;
        let format = parser
            .get_parsed("LOG_FORMAT", LogFormat::default(), "log format (pretty/json)")
            .value;
        let file = parser.get_path("LOG_FILE", None).value;
        Self {
            level,
            format,
            stderr: false,
            file,
        }
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

/// Keeps background log writers alive. Drop at the end of `main` to flush.
#[must_use = "dropping the guards stops file logging"]
#[derive(Default)]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuards")
            .field("file", &self._file.is_some())
            .finish()
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let (layers, guards) = build_layers(config)?;
    let filter = build_filter(&config.level)?;
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    Ok(guards)
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|source| LoggingError::Filter {
        filter: level.to_string(),
        source,
    })
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    }
}

fn build_layers(config: &LogConfig) -> Result<(Vec<BoxedLayer>, LoggingGuards), LoggingError> {
    let mut layers = Vec::new();
    let mut guards = LoggingGuards::default();

    if config.stderr {
        layers.push(format_layer(
            config.format,
            std::io::stderr,
            console::colors_enabled_stderr(),
        ));
    }

    if let Some(path) = &config.file {
        let (dir, file_name) = split_log_path(path)?;
        std::fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        let appender = tracing_appender::rolling::never(&dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(format_layer(config.format, writer, false));
        guards._file = Some(guard);
    }

    Ok((layers, guards))
}

fn split_log_path(path: &Path) -> Result<(PathBuf, std::ffi::OsString), LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::FilePath(path.to_path_buf()))?
        .to_os_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;
    use tempfile::TempDir;

    fn set_env(key: &str, value: &str) {
        // SAFETY: serialized via env_test_lock
        unsafe { std::env::set_var(key, value) };
    }

    fn cleanup_env() {
        for var in ["FAULTLINE_LOG", "FAULTLINE_LOG_FORMAT", "FAULTLINE_LOG_FILE"] {
            // SAFETY: serialized via env_test_lock
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_from_env_defaults() {
        let _guard = env_test_lock();
        cleanup_env();

        let config = LogConfig::from_env("warn");
        assert_eq!(config, LogConfig::new("warn"));
    }

    #[test]
    fn test_from_env_reads_variables() {
        let _guard = env_test_lock();
        cleanup_env();
        set_env("FAULTLINE_LOG", "faultline_common=trace");
        set_env("FAULTLINE_LOG_FORMAT", "JSON");
        set_env("FAULTLINE_LOG_FILE", "/tmp/faultline/run.log");

        let config = LogConfig::from_env("info").with_stderr();
        cleanup_env();

        assert_eq!(config.level, "faultline_common=trace");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/faultline/run.log")));
        assert!(config.stderr);
    }

    #[test]
    fn test_invalid_format_falls_back() {
        let _guard = env_test_lock();
        cleanup_env();
        set_env("FAULTLINE_LOG_FORMAT", "xml");
        let config = LogConfig::from_env("info");
        cleanup_env();
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let err = build_filter("faultline=[").unwrap_err();
        assert!(matches!(err, LoggingError::Filter { .. }));
    }

    #[test]
    fn test_file_layer_writes_events() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("faultline.log");
        let config = LogConfig::new("info")
            .with_format(LogFormat::Json)
            .with_file(&path);

        let (layers, guards) = build_layers(&config).unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(layers)
            .with(build_filter(&config.level).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(kind = "server", "Handled failure");
            tracing::debug!("filtered out");
        });
        drop(guards);

        let contents = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "Handled failure");
        assert_eq!(line["fields"]["kind"], "server");
        assert!(!contents.contains("filtered out"));
    }

    #[test]
    fn test_log_path_without_file_name() {
        let err = split_log_path(Path::new("/")).unwrap_err();
        assert!(matches!(err, LoggingError::FilePath(_)));

        let (dir, name) = split_log_path(Path::new("run.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "run.log");
    }
}
