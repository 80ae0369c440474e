//! Process-wide fault interception.
//!
//! Two sources of otherwise-unobserved failures are routed into the
//! [`ErrorHandler`]: panics, through a chained panic hook, and failed
//! background tasks started with [`FaultInterceptor::spawn`].

use crate::errors::{AsFailure, Failure};
use crate::handler::{self, Context, ErrorHandler, HandleOptions, Handled};
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::future::Future;
use std::panic::PanicHookInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::debug;

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Failure name given to panics.
pub const PANIC_NAME: &str = "panic";

/// A synchronous fault nobody caught.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UncaughtFault {
    pub message: String,
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// The underlying failure, when one is available.
    pub failure: Option<Failure>,
}

impl UncaughtFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, filename: impl Into<String>, line: u32, column: u32) -> Self {
        self.filename = Some(filename.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Describe a panic. The backtrace becomes the failure's stack when
    /// backtraces are enabled.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());

        let mut failure = Failure::new(message.clone()).with_name(PANIC_NAME);
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            failure = failure.with_stack(backtrace.to_string());
        }

        let fault = Self::new(message).with_failure(failure);
        match info.location() {
            Some(location) => fault.at(location.file(), location.line(), location.column()),
            None => fault,
        }
    }

    fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert(
            "filename".to_string(),
            self.filename.clone().map_or(Value::Null, Value::from),
        );
        context.insert(
            "line".to_string(),
            self.line.map_or(Value::Null, Value::from),
        );
        context.insert(
            "column".to_string(),
            self.column.map_or(Value::Null, Value::from),
        );
        context
    }
}

/// Routes uncaught faults and unobserved task failures into a handler.
#[derive(Debug, Clone)]
pub struct FaultInterceptor {
    handler: Arc<ErrorHandler>,
}

impl FaultInterceptor {
    pub fn new(handler: Arc<ErrorHandler>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    /// Handle a synchronous fault with its location as context.
    pub fn on_uncaught(&self, fault: UncaughtFault) -> Handled {
        let context = fault.context();
        let failure = match fault.failure {
            Some(failure) => failure,
            None => Failure::new(fault.message),
        };
        self.handler.handle(failure, context, HandleOptions::default())
    }

    /// Handle a failure nobody awaited. A missing reason is handled as an
    /// absent failure.
    pub fn on_unhandled_rejection(&self, reason: Option<Failure>) -> Handled {
        let mut context = Context::new();
        context.insert("promise".to_string(), Value::Bool(true));
        self.handler
            .handle(reason.unwrap_or_default(), context, HandleOptions::default())
    }

    /// Run a fallible task on the current tokio runtime. An `Err` result is
    /// routed through [`FaultInterceptor::on_unhandled_rejection`] and the
    /// task resolves to `None`.
    pub fn spawn<F, T, E>(&self, fut: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: AsFailure + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            match fut.await {
                Ok(value) => Some(value),
                Err(err) => {
                    this.on_unhandled_rejection(Some(err.as_failure().into_owned()));
                    None
                }
            }
        })
    }

    /// Install the panic hook. Returns `false` if a hook was already
    /// installed in this process.
    ///
    /// The previous hook still runs after the panic is handled. Panics raised
    /// while a failure is being handled on the same thread skip the handler.
    pub fn install(&self) -> bool {
        if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
            debug!("Panic hook already installed");
            return false;
        }

        let previous = std::panic::take_hook();
        let this = self.clone();
        std::panic::set_hook(Box::new(move |info| {
            if !handler::handling_on_this_thread() {
                this.on_uncaught(UncaughtFault::from_panic(info));
            }
            previous(info);
        }));
        debug!("Panic hook installed");
        true
    }

    /// Whether a panic hook has been installed in this process.
    pub fn is_installed() -> bool {
        HOOK_INSTALLED.load(Ordering::SeqCst)
    }
}
