//! Recording doubles for the reporter, presenter and transport seams.
//!
//! Every double is cheaply cloneable and shares its recording, so a test can
//! hand one clone to the code under test and inspect the other.

use crate::errors::Failure;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::log_store::LogEntry;
use crate::notify::{NotificationRequest, PresentError, Presenter};
use crate::report::{ReportError, ReportSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Report sink that keeps every delivered entry.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    delay: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for `delay` in every send, like a slow collector.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ReportSink for RecordingSink {
    fn send(&self, entry: &LogEntry) -> Result<(), ReportError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

/// Report sink that rejects every delivery.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ReportSink for FailingSink {
    fn send(&self, _entry: &LogEntry) -> Result<(), ReportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ReportError::Transport("collector unreachable".to_string()))
    }
}

/// Presenter that keeps every request.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    requests: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, request: &NotificationRequest) -> Result<(), PresentError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        Ok(())
    }
}

/// Transport replaying queued outcomes in order.
///
/// Once the script runs out every call fails as a network error.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<HttpResponse, Failure>>>>,
    calls: Arc<Mutex<Vec<(String, HttpRequest)>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn respond(self, response: HttpResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a transport failure.
    #[must_use]
    pub fn fail(self, failure: Failure) -> Self {
        self.push(Err(failure));
        self
    }

    fn push(&self, outcome: Result<HttpResponse, Failure>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Every `(url, request)` executed so far.
    pub fn calls(&self) -> Vec<(String, HttpRequest)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, url: &str, request: &HttpRequest) -> Result<HttpResponse, Failure> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((url.to_string(), request.clone()));
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(Failure::network("script exhausted")))
    }
}
