//! The raw failure envelope handed to the classifier.
//!
//! A [`Failure`] carries exactly the fields the classifier and formatter know
//! how to probe. Nothing else about an error is inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::io;

/// Name tag of a failure.
///
/// The three well-known names drive classification; anything else is carried
/// through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FailureName {
    /// Type confusion at a call boundary, typically a failed fetch
    TypeError,
    /// Connectivity failure
    NetworkError,
    /// Operation exceeded its deadline
    TimeoutError,
    Other(String),
}

impl FailureName {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TypeError => "TypeError",
            Self::NetworkError => "NetworkError",
            Self::TimeoutError => "TimeoutError",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for FailureName {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TypeError" => Self::TypeError,
            "NetworkError" => Self::NetworkError,
            "TimeoutError" => Self::TimeoutError,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for FailureName {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<FailureName> for String {
    fn from(value: FailureName) -> Self {
        match value {
            FailureName::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FailureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw failure, before classification.
///
/// `Failure::default()` stands for an absent failure (nothing was thrown or
/// the rejection carried no reason) and classifies as `unknown/medium`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FailureName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// HTTP-like status code. Zero is treated as absent.
    #[serde(default, alias = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    /// Message written for end users; always wins when formatting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Structured payload, e.g. a parsed error response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Failure {
    /// A failure with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A connectivity failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message).with_name(FailureName::NetworkError)
    }

    /// A deadline failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_name(FailureName::TimeoutError)
    }

    /// A failure carrying an HTTP-like status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(message).with_status(status)
    }

    /// A failure carrying a validation error collection.
    pub fn validation(errors: Value) -> Self {
        Self {
            errors: Some(errors),
            ..Self::default()
        }
    }

    /// Build from any standard error, keeping its source chain as the stack.
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        let mut failure = Self::new(err.to_string());
        if !chain.is_empty() {
            failure.stack = Some(chain.join("\n"));
        }
        failure
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<FailureName>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: Value) -> Self {
        self.validation = Some(validation);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    #[must_use]
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Message if present and non-empty.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }

    /// User-facing message if present and non-empty.
    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref().filter(|m| !m.is_empty())
    }

    /// Status code if present and non-zero.
    pub fn status(&self) -> Option<u16> {
        self.status.filter(|s| *s != 0)
    }

    /// Whether a validation payload or errors collection is present and truthy.
    pub fn has_validation_shape(&self) -> bool {
        self.validation.as_ref().is_some_and(truthy) || self.errors.as_ref().is_some_and(truthy)
    }

    /// True for `Failure::default()`-like values with nothing to inspect.
    pub fn is_absent(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.message()) {
            (Some(name), Some(message)) => write!(f, "{name}: {message}"),
            (None, Some(message)) => f.write_str(message),
            (Some(name), None) => f.write_str(name.as_str()),
            (None, None) => match self.status() {
                Some(status) => write!(f, "HTTP {status}"),
                None => f.write_str("unknown failure"),
            },
        }
    }
}

impl std::error::Error for Failure {}

impl From<&io::Error> for Failure {
    fn from(err: &io::Error) -> Self {
        let failure = Self::from_error(err);
        match err.kind() {
            io::ErrorKind::TimedOut => failure.with_name(FailureName::TimeoutError),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown => failure.with_name(FailureName::NetworkError),
            _ => failure,
        }
    }
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}

/// View an error as a [`Failure`] without consuming it.
///
/// Implement this for application error types so the retry executor and the
/// interceptor can classify them.
pub trait AsFailure {
    fn as_failure(&self) -> Cow<'_, Failure>;
}

impl AsFailure for Failure {
    fn as_failure(&self) -> Cow<'_, Failure> {
        Cow::Borrowed(self)
    }
}

impl AsFailure for io::Error {
    fn as_failure(&self) -> Cow<'_, Failure> {
        Cow::Owned(Failure::from(self))
    }
}

impl<T: AsFailure + ?Sized> AsFailure for &T {
    fn as_failure(&self) -> Cow<'_, Failure> {
        (**self).as_failure()
    }
}

impl<T: AsFailure + ?Sized> AsFailure for Box<T> {
    fn as_failure(&self) -> Cow<'_, Failure> {
        (**self).as_failure()
    }
}

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_round_trips_known_and_custom() {
        assert_eq!(FailureName::from("TypeError"), FailureName::TypeError);
        assert_eq!(
            FailureName::from("SyntaxError"),
            FailureName::Other("SyntaxError".to_string())
        );
        let json = serde_json::to_string(&FailureName::TimeoutError).unwrap();
        assert_eq!(json, "\"TimeoutError\"");
    }

    #[test]
    fn test_failure_json_omits_empty_fields() {
        let failure = Failure::http(404, "missing");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json, json!({"message": "missing", "status": 404}));
    }

    #[test]
    fn test_status_zero_is_absent() {
        let failure = Failure::default().with_status(0);
        assert_eq!(failure.status(), None);
    }

    #[test]
    fn test_empty_message_is_absent() {
        let failure = Failure::new("");
        assert_eq!(failure.message(), None);
    }

    #[test]
    fn test_status_code_spelling_is_accepted() {
        let failure: Failure =
            serde_json::from_value(json!({"message": "gone", "statusCode": 404})).unwrap();
        assert_eq!(failure.status(), Some(404));
        assert_eq!(
            crate::classify::classify(&failure).kind,
            crate::errors::ErrorKind::NotFound
        );

        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json, json!({"message": "gone", "status": 404}));
    }

    #[test]
    fn test_empty_user_message_is_absent() {
        let failure = Failure::default().with_user_message("");
        assert_eq!(failure.user_message(), None);
    }

    #[test]
    fn test_validation_shape_uses_truthiness() {
        assert!(Failure::validation(json!([])).has_validation_shape());
        assert!(Failure::validation(json!({"email": "required"})).has_validation_shape());
        assert!(!Failure::validation(json!(null)).has_validation_shape());
        assert!(!Failure::default().with_validation(json!(false)).has_validation_shape());
        assert!(!Failure::default().with_validation(json!("")).has_validation_shape());
        assert!(Failure::default().with_validation(json!(true)).has_validation_shape());
    }

    #[test]
    fn test_display_variants() {
        assert_eq!(Failure::new("boom").to_string(), "boom");
        assert_eq!(Failure::timeout("slow").to_string(), "TimeoutError: slow");
        assert_eq!(Failure::default().with_status(502).to_string(), "HTTP 502");
        assert_eq!(Failure::default().to_string(), "unknown failure");
    }

    #[test]
    fn test_io_error_mapping() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "read timed out");
        assert_eq!(
            Failure::from(&timed_out).name,
            Some(FailureName::TimeoutError)
        );

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(Failure::from(refused).name, Some(FailureName::NetworkError));

        let other = io::Error::other("disk on fire");
        let failure = Failure::from(other);
        assert_eq!(failure.name, None);
        assert_eq!(failure.message(), Some("disk on fire"));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("sync failed")]
    struct SyncError {
        #[source]
        cause: io::Error,
    }

    #[test]
    fn test_from_error_keeps_source_chain() {
        let err = SyncError {
            cause: io::Error::other("socket closed"),
        };
        let failure = Failure::from_error(&err);
        assert_eq!(failure.message(), Some("sync failed"));
        assert_eq!(failure.stack.as_deref(), Some("caused by: socket closed"));
    }

    #[test]
    fn test_is_absent() {
        assert!(Failure::default().is_absent());
        assert!(!Failure::new("x").is_absent());
    }

    #[test]
    fn test_as_failure_borrows_for_failure() {
        let failure = Failure::new("x");
        assert!(matches!(failure.as_failure(), Cow::Borrowed(_)));
        let boxed: Box<Failure> = Box::new(Failure::new("y"));
        assert_eq!(boxed.as_failure().message(), Some("y"));
    }
}
