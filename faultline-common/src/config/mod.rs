//! Configuration for the error-handling stack.
//!
//! Values are resolved in three layers: built-in defaults, the TOML config
//! file (`<config_dir>/faultline/config.toml` or an explicit path), and
//! `FAULTLINE_*` environment variables. The result is validated before use.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

use crate::errors::{ErrorKind, Severity};
use crate::log_store::{DEFAULT_CAPACITY, HostInfo, STORAGE_KEY, default_agent};
use crate::report::Dispatch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Largest accepted log capacity.
pub const MAX_CAPACITY: u32 = 10_000;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment configuration: {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    pub log_store: LogStoreConfig,
    pub report: ReportConfig,
    pub notify: NotifyConfig,
    pub host: HostConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
}

/// `[log_store]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStoreConfig {
    /// Slot file. Defaults to `<data_dir>/faultline/errorLogs.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub capacity: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl LogStoreConfig {
    /// Configured path, or the per-user default. `None` only when no data
    /// directory can be determined.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("faultline").join(format!("{STORAGE_KEY}.json")))
        })
    }
}

/// `[report]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Collector base URL. Reporting is off when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub min_severity: Severity,
    pub timeout_ms: u64,
    pub dispatch: Dispatch,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            min_severity: Severity::High,
            timeout_ms: 5_000,
            dispatch: Dispatch::Detached,
        }
    }
}

/// `[notify]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub default_duration_ms: u64,
    /// Force banner styling on or off; detected from the terminal when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styled: Option<bool>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 5_000,
            styled: None,
        }
    }
}

/// `[host]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl HostConfig {
    /// Host info with configured values over detected ones.
    pub fn resolve(&self) -> HostInfo {
        let detected = HostInfo::detect();
        HostInfo {
            url: self.url.clone().unwrap_or(detected.url),
            agent: self.agent.clone().unwrap_or_else(default_agent),
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            retryable: vec![ErrorKind::Network, ErrorKind::Timeout, ErrorKind::Server],
        }
    }
}

/// `[http]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl FaultlineConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("faultline").join("config.toml"))
    }

    /// Load, apply environment overrides and validate.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `FAULTLINE_*` overrides, reporting every invalid variable.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let mut parser = EnvParser::new();

        parser
            .get_path("STORE_PATH", self.log_store.path.clone())
            .apply_to(&mut self.log_store.path);
        let capacity = u32::try_from(self.log_store.capacity).unwrap_or(MAX_CAPACITY);
        let capacity = parser.get_u32_range("STORE_CAPACITY", capacity, 1, MAX_CAPACITY);
        if capacity.is_from_env() {
            self.log_store.capacity = capacity.value as usize;
        }

        let base_url = parser.get_optional_string("REPORT_URL");
        base_url.apply_to(&mut self.report.base_url);
        parser
            .get_parsed(
                "REPORT_MIN_SEVERITY",
                self.report.min_severity,
                "severity (low/medium/high/critical)",
            )
            .apply_to(&mut self.report.min_severity);
        parser
            .get_u64_range("REPORT_TIMEOUT_MS", self.report.timeout_ms, 1, 600_000)
            .apply_to(&mut self.report.timeout_ms);
        parser
            .get_parsed("REPORT_DISPATCH", self.report.dispatch, "dispatch (detached/inline)")
            .apply_to(&mut self.report.dispatch);

        parser
            .get_u64_range(
                "NOTIFY_DURATION_MS",
                self.notify.default_duration_ms,
                0,
                3_600_000,
            )
            .apply_to(&mut self.notify.default_duration_ms);
        let styled = parser.get_bool("NOTIFY_STYLED", self.notify.styled.unwrap_or(false));
        if styled.is_from_env() {
            self.notify.styled = Some(styled.value);
        }

        parser
            .get_optional_string("HOST_URL")
            .apply_to(&mut self.host.url);
        parser
            .get_optional_string("HOST_AGENT")
            .apply_to(&mut self.host.agent);

        parser
            .get_u32_range("RETRY_MAX", self.retry.max_retries, 0, 20)
            .apply_to(&mut self.retry.max_retries);
        parser
            .get_u64_range("RETRY_BASE_DELAY_MS", self.retry.base_delay_ms, 1, 600_000)
            .apply_to(&mut self.retry.base_delay_ms);
        parser
            .get_parsed_list("RETRY_KINDS", self.retry.retryable.clone(), "error kinds")
            .apply_to(&mut self.retry.retryable);

        parser
            .get_u64_range("HTTP_TIMEOUT_MS", self.http.timeout_ms, 1, 600_000)
            .apply_to(&mut self.http.timeout_ms);

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_store.capacity == 0 || self.log_store.capacity > MAX_CAPACITY as usize {
            return Err(ConfigError::Invalid(format!(
                "log_store.capacity must be within 1..={MAX_CAPACITY}, got {}",
                self.log_store.capacity
            )));
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must be positive".to_string(),
            ));
        }
        if self.report.timeout_ms == 0 || self.http.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be positive".to_string(),
            ));
        }
        if let Some(url) = self.report.base_url.as_deref()
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "report.base_url must be an http(s) URL, got '{url}'"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
