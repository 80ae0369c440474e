//! Faultline common library.
//!
//! Centralized error handling for applications and tools: a failure is
//! classified into an [`ErrorKind`] and [`Severity`], turned into a
//! user-facing message, appended to a capacity-bounded persistent log,
//! reported to a collection endpoint when severe enough, and surfaced through
//! a notifier. Transient failures can be retried with exponential backoff.
//!
//! The [`ErrorHandler`] facade is the single entry point other code calls.

pub mod classify;
pub mod config;
pub mod errors;
pub mod format;
pub mod handler;
pub mod http;
pub mod intercept;
pub mod log_store;
pub mod logging;
pub mod notify;
pub mod report;
pub mod retry;
pub mod testing;

pub use classify::{classify, classify_opt};
pub use config::{ConfigError, FaultlineConfig};
pub use errors::{AsFailure, Classification, ErrorKind, Failure, FailureName, Severity};
pub use format::MessageTemplates;
pub use handler::{Context, ErrorHandler, HandleOptions, Handled, HostInfo};
pub use http::{HttpRequest, HttpResponse, Method, NetworkClient, Transport, UreqTransport};
pub use intercept::{FaultInterceptor, UncaughtFault};
pub use log_store::{FileBackend, LogBackend, LogEntry, LogStore, MemoryBackend, StoreError};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use notify::{Banner, NotificationRequest, Notifier, PresentError, Presenter};
pub use report::{Dispatch, HttpSink, RemoteReporter, ReportError, ReportPolicy, ReportSink};
pub use retry::{RetryEvent, RetryPolicy, retry, retry_with};
