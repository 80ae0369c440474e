//! The error-handling facade.
//!
//! [`ErrorHandler::handle`] runs one failure through the whole pipeline in a
//! fixed order: classify, format, log, report, notify. It never fails.

use crate::classify::classify;
use crate::config::FaultlineConfig;
use crate::errors::{AsFailure, Classification, Failure, Severity};
use crate::format::MessageTemplates;
use crate::log_store::{LogEntry, LogStore};
use crate::notify::{Banner, Notifier};
use crate::report::{HttpSink, RemoteReporter, ReportPolicy};
use std::cell::Cell;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub use crate::log_store::{Context, HostInfo};

thread_local! {
    static HANDLING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside [`ErrorHandler::handle`].
pub(crate) fn handling_on_this_thread() -> bool {
    HANDLING.with(Cell::get)
}

struct HandlingScope {
    outer: bool,
}

impl HandlingScope {
    fn enter() -> Self {
        Self {
            outer: HANDLING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for HandlingScope {
    fn drop(&mut self) {
        HANDLING.with(|flag| flag.set(self.outer));
    }
}

/// Per-call handling options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOptions {
    /// Log and report, but do not notify the user.
    pub silent: bool,
    /// Override the notification display time.
    pub duration: Option<Duration>,
    /// Override whether the notification is modal.
    pub show_modal: Option<bool>,
}

impl HandleOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn with_modal(mut self, modal: bool) -> Self {
        self.show_modal = Some(modal);
        self
    }
}

/// Outcome of handling a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub failure: Failure,
    pub classification: Classification,
    /// What the user was (or would have been) shown.
    pub user_message: String,
    pub handled: bool,
}

impl std::fmt::Display for Handled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message)
    }
}

impl std::error::Error for Handled {}

/// Classifies, formats, logs, reports and notifies.
pub struct ErrorHandler {
    templates: MessageTemplates,
    store: Arc<LogStore>,
    reporter: Option<RemoteReporter>,
    notifier: Notifier,
    host: HostInfo,
    /// Persistence and report tasks not yet awaited.
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("store", &self.store)
            .field("reporter", &self.reporter)
            .field("notifier", &self.notifier)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl ErrorHandler {
    /// Handler over `store` with default templates, no reporter, and the
    /// stderr banner as the only notification surface.
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            templates: MessageTemplates::default(),
            store,
            reporter: None,
            notifier: Notifier::new(),
            host: HostInfo::detect(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Wire a handler from configuration.
    pub fn from_config(config: &FaultlineConfig) -> Self {
        let store = match config.log_store.resolved_path() {
            Some(path) => LogStore::at_path(path),
            None => LogStore::in_memory(),
        }
        .with_capacity(config.log_store.capacity);

        let mut banner = Banner::stderr();
        if let Some(styled) = config.notify.styled {
            banner = banner.styled(styled);
        }
        let notifier = Notifier::new()
            .with_banner(banner)
            .with_default_duration(Duration::from_millis(config.notify.default_duration_ms));

        let mut handler = Self::new(Arc::new(store))
            .with_notifier(notifier)
            .with_host(config.host.resolve());

        if let Some(base_url) = config.report.base_url.as_deref() {
            let sink = HttpSink::new(base_url, Duration::from_millis(config.report.timeout_ms));
            let reporter = RemoteReporter::new(sink)
                .with_policy(ReportPolicy {
                    min_severity: config.report.min_severity,
                })
                .with_dispatch(config.report.dispatch);
            handler = handler.with_reporter(reporter);
        }

        handler
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: RemoteReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_templates(mut self, templates: MessageTemplates) -> Self {
        self.templates = templates;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Handle one failure.
    pub fn handle(&self, failure: Failure, context: Context, options: HandleOptions) -> Handled {
        let _scope = HandlingScope::enter();
        let classification = classify(&failure);
        let user_message = self.templates.format(&failure, classification);

        let entry = LogEntry::new(&failure, classification, context, &self.host);
        match classification.severity {
            Severity::Low | Severity::Medium => warn!(
                kind = %classification.kind,
                severity = %classification.severity,
                detail = %entry.message,
                "Handled failure"
            ),
            Severity::High | Severity::Critical => error!(
                kind = %classification.kind,
                severity = %classification.severity,
                detail = %entry.message,
                "Handled failure"
            ),
        }

        let report = self
            .reporter
            .as_ref()
            .filter(|reporter| reporter.should_report(classification.severity))
            .map(|reporter| (reporter, entry.clone()));
        self.track(self.store.append(entry));
        if let Some((reporter, entry)) = report {
            self.track(reporter.report(entry));
        }

        if !options.silent {
            let request = self
                .notifier
                .request(user_message.clone(), classification.severity)
                .with_duration(options.duration)
                .with_modal(options.show_modal);
            self.notifier.notify(&request);
        }

        Handled {
            failure,
            classification,
            user_message,
            handled: true,
        }
    }

    /// Await `fut`; on failure, handle it and propagate the original error.
    pub async fn guard<F, T, E>(
        &self,
        fut: F,
        context: Context,
        options: HandleOptions,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: AsFailure,
    {
        match fut.await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.handle(err.as_failure().into_owned(), context, options);
                Err(err)
            }
        }
    }

    /// Await `fut`; on failure, handle it and return the handled record.
    pub async fn capture<F, T, E>(
        &self,
        fut: F,
        context: Context,
        options: HandleOptions,
    ) -> Result<T, Handled>
    where
        F: Future<Output = Result<T, E>>,
        E: AsFailure,
    {
        match fut.await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.handle(err.as_failure().into_owned(), context, options)),
        }
    }

    /// Stored entries, oldest first.
    pub fn error_logs(&self) -> Vec<LogEntry> {
        self.store.list()
    }

    pub fn clear_error_logs(&self) {
        self.track(self.store.clear());
    }

    /// Wait for the persistence writes and report deliveries started so far.
    ///
    /// Call before the process exits; the tasks otherwise run detached.
    pub async fn flush(&self) {
        let tasks = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Background handling task failed");
            }
        }
    }

    fn track(&self, task: Option<JoinHandle<()>>) {
        if let Some(task) = task {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.retain(|t| !t.is_finished());
            pending.push(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::report::Dispatch;
    use crate::test_guard;
    use crate::testing::{FailingSink, RecordingPresenter, RecordingSink};
    use serde_json::json;

    struct Harness {
        handler: ErrorHandler,
        sink: RecordingSink,
        presenter: RecordingPresenter,
    }

    fn harness() -> Harness {
        let sink = RecordingSink::new();
        let presenter = RecordingPresenter::new();
        let handler = ErrorHandler::new(Arc::new(LogStore::in_memory()))
            .with_reporter(RemoteReporter::new(sink.clone()).with_dispatch(Dispatch::Inline))
            .with_notifier(Notifier::new().with_presenter(Arc::new(presenter.clone())))
            .with_host(HostInfo::new("file:///bin/app", "faultline/test"));
        Harness {
            handler,
            sink,
            presenter,
        }
    }

    #[test]
    fn test_server_error_logged_reported_and_notified() {
        let _guard = test_guard!();
        let h = harness();

        let handled = h.handler.handle(
            Failure::default().with_status(500),
            Context::new(),
            HandleOptions::default(),
        );

        assert!(handled.handled);
        assert_eq!(handled.classification.kind, ErrorKind::Server);
        assert_eq!(
            handled.user_message,
            h.handler.templates().template(ErrorKind::Server)
        );

        let logs = h.handler.error_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].severity, Severity::High);
        assert_eq!(logs[0].url, "file:///bin/app");

        assert_eq!(h.sink.entries().len(), 1);
        assert_eq!(h.sink.entries()[0], logs[0]);

        let shown = h.presenter.requests();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].message, handled.user_message);
        assert_eq!(shown[0].duration, Duration::from_millis(5000));
        assert!(!shown[0].modal);
    }

    #[test]
    fn test_silent_validation_logged_not_notified() {
        let _guard = test_guard!();
        let h = harness();

        let handled = h.handler.handle(
            Failure::validation(json!({"email": "required"})),
            Context::new(),
            HandleOptions::silent(),
        );

        assert_eq!(handled.classification.kind, ErrorKind::Validation);
        assert_eq!(h.handler.error_logs().len(), 1);
        assert!(h.sink.entries().is_empty(), "low severity is below the threshold");
        assert!(h.presenter.requests().is_empty());
    }

    #[test]
    fn test_not_found_uses_template() {
        let h = harness();
        let handled = h.handler.handle(
            Failure::default().with_status(404),
            Context::new(),
            HandleOptions::default(),
        );
        assert_eq!(
            handled.classification,
            Classification::new(ErrorKind::NotFound, Severity::Medium)
        );
        assert_eq!(handled.user_message, "The requested resource was not found.");
        assert!(h.sink.entries().is_empty());
    }

    #[test]
    fn test_options_override_notification() {
        let h = harness();
        h.handler.handle(
            Failure::http(500, "boom"),
            Context::new(),
            HandleOptions::default()
                .with_duration(Duration::ZERO)
                .with_modal(true),
        );
        let shown = h.presenter.requests();
        assert!(shown[0].modal);
        assert!(shown[0].is_sticky());
    }

    #[test]
    fn test_context_is_stored() {
        let h = harness();
        let mut context = Context::new();
        context.insert("component".to_string(), json!("checkout"));

        h.handler.handle(Failure::new("oops"), context.clone(), HandleOptions::silent());

        assert_eq!(h.handler.error_logs()[0].context, context);
    }

    #[test]
    fn test_reporter_threshold_is_configurable() {
        let sink = RecordingSink::new();
        let handler = ErrorHandler::new(Arc::new(LogStore::in_memory())).with_reporter(
            RemoteReporter::new(sink.clone())
                .with_dispatch(Dispatch::Inline)
                .with_policy(ReportPolicy {
                    min_severity: Severity::Medium,
                }),
        );

        handler.handle(Failure::timeout("slow"), Context::new(), HandleOptions::silent());
        handler.handle(
            Failure::validation(json!(["bad"])),
            Context::new(),
            HandleOptions::silent(),
        );

        let sent = sink.entries();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_clear_error_logs() {
        let h = harness();
        h.handler
            .handle(Failure::new("a"), Context::new(), HandleOptions::silent());
        h.handler.clear_error_logs();
        assert!(h.handler.error_logs().is_empty());
    }

    #[tokio::test]
    async fn test_guard_propagates_original_error() {
        let _guard = test_guard!();
        let h = harness();

        let result: Result<(), Failure> = h
            .handler
            .guard(
                async { Err(Failure::network("Failed to fetch")) },
                Context::new(),
                HandleOptions::default(),
            )
            .await;

        assert_eq!(result.unwrap_err(), Failure::network("Failed to fetch"));
        assert_eq!(h.handler.error_logs().len(), 1);
        assert_eq!(h.presenter.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_guard_passes_success_through() {
        let h = harness();
        let value = h
            .handler
            .guard(
                async { Ok::<_, Failure>(7) },
                Context::new(),
                HandleOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(h.handler.error_logs().is_empty());
    }

    #[tokio::test]
    async fn test_capture_returns_handled() {
        let h = harness();

        let result: Result<(), Handled> = h
            .handler
            .capture(
                async {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "deadline elapsed",
                    ))
                },
                Context::new(),
                HandleOptions::silent(),
            )
            .await;

        let handled = result.unwrap_err();
        assert_eq!(handled.classification.kind, ErrorKind::Timeout);
        assert_eq!(handled.to_string(), "deadline elapsed");
    }

    #[test]
    fn test_failing_report_is_swallowed() {
        let _guard = test_guard!();
        let sink = FailingSink::new();
        let presenter = RecordingPresenter::new();
        let handler = ErrorHandler::new(Arc::new(LogStore::in_memory()))
            .with_reporter(RemoteReporter::new(sink.clone()).with_dispatch(Dispatch::Inline))
            .with_notifier(Notifier::new().with_presenter(Arc::new(presenter.clone())));

        let handled = handler.handle(
            Failure::http(503, "upstream down"),
            Context::new(),
            HandleOptions::default(),
        );

        assert!(handled.handled);
        assert_eq!(handled.classification.kind, ErrorKind::Server);
        assert_eq!(sink.attempts(), 1);
        // The rejected delivery is not handled as a second failure.
        assert_eq!(handler.error_logs().len(), 1);
        assert_eq!(presenter.requests().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_report_does_not_stall_runtime() {
        let _guard = test_guard!();
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("errorLogs.json");
        let sink = RecordingSink::new().with_delay(Duration::from_millis(500));
        let handler = ErrorHandler::new(Arc::new(LogStore::at_path(&path)))
            .with_reporter(RemoteReporter::new(sink.clone()))
            .with_notifier(
                Notifier::new().with_presenter(Arc::new(RecordingPresenter::new())),
            );

        let started = std::time::Instant::now();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });
        tokio::task::yield_now().await;

        handler.handle(Failure::http(500, "boom"), Context::new(), HandleOptions::default());
        assert_eq!(handler.error_logs().len(), 1);

        let fired_after = timer.await.unwrap();
        assert!(
            fired_after < Duration::from_millis(250),
            "timer fired after {fired_after:?}"
        );

        handler.flush().await;
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(LogStore::at_path(&path).len(), 1);
    }
}
