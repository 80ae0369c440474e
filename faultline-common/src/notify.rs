//! User notification.
//!
//! A [`Notifier`] turns a formatted message into a [`NotificationRequest`] and
//! hands it to a host-supplied [`Presenter`]. When no presenter is installed,
//! or the presenter fails, a single-line [`Banner`] on stderr is the fallback.

use crate::errors::Severity;
use console::style;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How long a non-critical notification stays visible.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(5000);

/// What to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub message: String,
    pub severity: Severity,
    /// Display time. Zero means the notification stays until dismissed.
    pub duration: Duration,
    /// Show as a blocking dialog rather than a transient notice.
    pub modal: bool,
}

impl NotificationRequest {
    /// Request with severity-derived defaults: critical failures are sticky
    /// and modal, everything else shows for [`DEFAULT_DURATION`].
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self::with_default_duration(message, severity, DEFAULT_DURATION)
    }

    /// Like [`NotificationRequest::new`] with a different non-critical duration.
    pub fn with_default_duration(
        message: impl Into<String>,
        severity: Severity,
        default_duration: Duration,
    ) -> Self {
        let critical = severity == Severity::Critical;
        Self {
            message: message.into(),
            severity,
            duration: if critical { Duration::ZERO } else { default_duration },
            modal: critical,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        if let Some(duration) = duration {
            self.duration = duration;
        }
        self
    }

    #[must_use]
    pub fn with_modal(mut self, modal: Option<bool>) -> Self {
        if let Some(modal) = modal {
            self.modal = modal;
        }
        self
    }

    pub fn is_sticky(&self) -> bool {
        self.duration.is_zero()
    }
}

/// Errors a presenter may report.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("no display surface available")]
    Unavailable,

    #[error("presentation failed: {0}")]
    Failed(String),
}

/// Host hook that displays notifications.
pub trait Presenter: Send + Sync {
    fn present(&self, request: &NotificationRequest) -> Result<(), PresentError>;
}

/// Fallback presenter writing one line per notification.
pub struct Banner {
    out: Mutex<Box<dyn Write + Send>>,
    styled: bool,
}

impl std::fmt::Debug for Banner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Banner")
            .field("styled", &self.styled)
            .finish_non_exhaustive()
    }
}

impl Default for Banner {
    fn default() -> Self {
        Self::stderr()
    }
}

impl Banner {
    /// Banner on stderr, styled when stderr supports colors.
    pub fn stderr() -> Self {
        Self {
            out: Mutex::new(Box::new(io::stderr())),
            styled: console::colors_enabled_stderr(),
        }
    }

    /// Banner on an arbitrary writer.
    pub fn to_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            styled: false,
        }
    }

    #[must_use]
    pub fn styled(mut self, styled: bool) -> Self {
        self.styled = styled;
        self
    }

    /// Render one notification line.
    pub fn render(&self, request: &NotificationRequest) -> String {
        let label = format!("[{}]", request.severity);
        let label = if self.styled {
            let styled = style(label).bold().force_styling(true);
            match request.severity {
                Severity::Low => styled.cyan(),
                Severity::Medium => styled.yellow(),
                Severity::High => styled.red(),
                Severity::Critical => styled.white().on_red(),
            }
            .to_string()
        } else {
            label
        };

        if request.modal {
            format!("{label} {} (action required)", request.message)
        } else {
            format!("{label} {}", request.message)
        }
    }

    fn show(&self, request: &NotificationRequest) {
        let line = self.render(request);
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            debug!(error = %e, "Failed to write notification banner");
        }
    }
}

impl Presenter for Banner {
    fn present(&self, request: &NotificationRequest) -> Result<(), PresentError> {
        self.show(request);
        Ok(())
    }
}

/// Shows notifications through the installed presenter, falling back to the
/// banner.
#[derive(Clone)]
pub struct Notifier {
    presenter: Option<Arc<dyn Presenter>>,
    banner: Arc<Banner>,
    default_duration: Duration,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("presenter", &self.presenter.is_some())
            .field("banner", &self.banner)
            .field("default_duration", &self.default_duration)
            .finish()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Notifier without a presenter; everything goes to the stderr banner.
    pub fn new() -> Self {
        Self {
            presenter: None,
            banner: Arc::new(Banner::stderr()),
            default_duration: DEFAULT_DURATION,
        }
    }

    /// Display time for non-critical notifications.
    #[must_use]
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Build the request for a message using this notifier's defaults.
    pub fn request(&self, message: impl Into<String>, severity: Severity) -> NotificationRequest {
        NotificationRequest::with_default_duration(message, severity, self.default_duration)
    }

    #[must_use]
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    #[must_use]
    pub fn with_banner(mut self, banner: Banner) -> Self {
        self.banner = Arc::new(banner);
        self
    }

    pub fn has_presenter(&self) -> bool {
        self.presenter.is_some()
    }

    /// Show a notification. Never fails.
    pub fn notify(&self, request: &NotificationRequest) {
        if let Some(presenter) = &self.presenter {
            match presenter.present(request) {
                Ok(()) => return,
                Err(e) => debug!(error = %e, "Presenter failed, falling back to banner"),
            }
        }
        self.banner.show(request);
    }
}
