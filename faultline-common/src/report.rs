//! Remote error reporting.
//!
//! Severe log entries are POSTed to a collection endpoint. Reporting is
//! fire-and-forget: the outcome of every delivery is observed and dropped so
//! that an unreachable collector can never feed back into error handling.

use crate::errors::Severity;
use crate::log_store::LogEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Collection route appended to the configured base URL.
pub const COLLECTION_ROUTE: &str = "/api/error-log/";

/// Default request timeout for report delivery.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from a report sink. Never surfaced past the reporter.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report transport failed: {0}")]
    Transport(String),

    #[error("collector responded with status {0}")]
    Status(u16),

    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for error reports.
pub trait ReportSink: Send + Sync + 'static {
    /// Deliver one entry. Blocking.
    fn send(&self, entry: &LogEntry) -> Result<(), ReportError>;
}

/// POSTs entries as JSON with `ureq`.
pub struct HttpSink {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpSink {
    /// Sink for `<base_url>/api/error-log/`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), COLLECTION_ROUTE);
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { endpoint, agent }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReportSink for HttpSink {
    fn send(&self, entry: &LogEntry) -> Result<(), ReportError> {
        let body = serde_json::to_string(entry)?;
        match self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .send(body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(status)) => Err(ReportError::Status(status)),
            Err(e) => Err(ReportError::Transport(e.to_string())),
        }
    }
}

/// Which entries get reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPolicy {
    /// Lowest severity that is reported.
    pub min_severity: Severity,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self {
            min_severity: Severity::High,
        }
    }
}

impl ReportPolicy {
    pub fn should_report(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

/// How a report is delivered relative to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// On a background task; the caller never waits.
    #[default]
    Detached,
    /// On the calling thread, before `report` returns.
    Inline,
}

impl Dispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detached => "detached",
            Self::Inline => "inline",
        }
    }
}

impl std::fmt::Display for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dispatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detached" => Ok(Self::Detached),
            "inline" => Ok(Self::Inline),
            other => Err(format!("unknown dispatch mode: {other}")),
        }
    }
}

/// Fire-and-forget reporter for severe log entries.
#[derive(Clone)]
pub struct RemoteReporter {
    sink: Arc<dyn ReportSink>,
    policy: ReportPolicy,
    dispatch: Dispatch,
}

impl std::fmt::Debug for RemoteReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteReporter")
            .field("policy", &self.policy)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

impl RemoteReporter {
    pub fn new(sink: impl ReportSink) -> Self {
        Self::from_shared(Arc::new(sink))
    }

    pub fn from_shared(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            policy: ReportPolicy::default(),
            dispatch: Dispatch::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReportPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn policy(&self) -> ReportPolicy {
        self.policy
    }

    /// Whether an entry of this severity would be reported.
    pub fn should_report(&self, severity: Severity) -> bool {
        self.policy.should_report(severity)
    }

    /// Deliver one entry, ignoring the outcome.
    ///
    /// Returns the background task when dispatched onto a tokio runtime, so a
    /// caller that is about to exit can wait for delivery.
    pub fn report(&self, entry: LogEntry) -> Option<JoinHandle<()>> {
        match self.dispatch {
            Dispatch::Inline => {
                deliver(self.sink.as_ref(), &entry);
                None
            }
            // A panicking thread may never get back to the runtime.
            Dispatch::Detached if std::thread::panicking() => {
                deliver(self.sink.as_ref(), &entry);
                None
            }
            Dispatch::Detached => {
                let sink = Arc::clone(&self.sink);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        Some(handle.spawn_blocking(move || deliver(sink.as_ref(), &entry)))
                    }
                    Err(_) => {
                        let spawned = std::thread::Builder::new()
                            .name("faultline-report".to_string())
                            .spawn(move || deliver(sink.as_ref(), &entry));
                        if let Err(e) = spawned {
                            debug!(error = %e, "Could not start report thread, dropping report");
                        }
                        None
                    }
                }
            }
        }
    }
}

fn deliver(sink: &dyn ReportSink, entry: &LogEntry) {
    match sink.send(entry) {
        Ok(()) => debug!(kind = %entry.kind, severity = %entry.severity, "Error report delivered"),
        Err(e) => debug!(error = %e, "Error report dropped"),
    }
}
