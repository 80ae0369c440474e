//! Network call wrapper.
//!
//! [`NetworkClient::call`] performs one request through a [`Transport`] and
//! routes every failure (non-2xx responses and transport errors alike)
//! through the [`ErrorHandler`] before returning it.

use crate::config::FaultlineConfig;
use crate::errors::{Failure, FailureName};
use crate::handler::{Context, ErrorHandler, HandleOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::borrow::Cow;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shown for requests that never reached the server.
pub const CONNECTIVITY_MESSAGE: &str =
    "Could not connect to the server. Check your internet connection.";

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// A request, minus the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    /// Request with a JSON body.
    pub fn json<T: Serialize + ?Sized>(
        method: Method,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(method)
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(body)?))
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response with its body fully read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Canonical reason phrase, empty when unknown.
    pub reason: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, reason: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Blocking request execution.
///
/// Implementations return every received response, whatever its status, and
/// reserve `Err` for requests that produced no response.
pub trait Transport: Send + Sync {
    fn execute(&self, url: &str, request: &HttpRequest) -> Result<HttpResponse, Failure>;
}

/// [`Transport`] over a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, url: &str, request: &HttpRequest) -> Result<HttpResponse, Failure> {
        let headers = &request.headers;
        let body = request.body.as_deref();
        let result = match request.method {
            Method::Get => with_headers(self.agent.get(url), headers).call(),
            Method::Delete => with_headers(self.agent.delete(url), headers).call(),
            Method::Head => with_headers(self.agent.head(url), headers).call(),
            Method::Post => send(with_headers(self.agent.post(url), headers), body),
            Method::Put => send(with_headers(self.agent.put(url), headers), body),
            Method::Patch => send(with_headers(self.agent.patch(url), headers), body),
        };

        let mut response = result.map_err(failure_from_ureq)?;
        let status = response.status();
        let mut body = Vec::new();
        if request.method != Method::Head {
            response
                .body_mut()
                .as_reader()
                .read_to_end(&mut body)
                .map_err(|e| io_failure(&e))?;
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

fn send(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

fn failure_from_ureq(err: ureq::Error) -> Failure {
    match err {
        ureq::Error::Timeout(_) => Failure::timeout(err.to_string()),
        ureq::Error::Io(io) => io_failure(&io),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            Failure::network(err.to_string())
        }
        other => Failure::new(other.to_string()),
    }
}

// I/O during a request is a connectivity problem unless it timed out.
fn io_failure(err: &std::io::Error) -> Failure {
    let failure = Failure::from(err);
    if failure.name.is_some() {
        failure
    } else {
        failure.with_name(FailureName::NetworkError)
    }
}

/// Build the failure for a non-2xx response.
///
/// A JSON body becomes the failure's data and may supply its message; any
/// other body is replaced by `{"message": "HTTP <status>: <reason>"}`.
pub fn failure_from_response(response: &HttpResponse) -> Failure {
    let status = response.status;
    let data = response.json::<Value>().unwrap_or_else(|_| {
        json!({ "message": format!("HTTP {status}: {}", response.reason) })
    });
    let message = data
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"));
    Failure::http(status, message).with_data(data)
}

/// Performs requests and handles their failures.
#[derive(Clone)]
pub struct NetworkClient {
    transport: Arc<dyn Transport>,
    handler: Arc<ErrorHandler>,
}

impl fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkClient")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl NetworkClient {
    pub fn new(transport: impl Transport + 'static, handler: Arc<ErrorHandler>) -> Self {
        Self {
            transport: Arc::new(transport),
            handler,
        }
    }

    /// Client over a `ureq` transport with the configured timeout.
    pub fn from_config(config: &FaultlineConfig, handler: Arc<ErrorHandler>) -> Self {
        Self::new(
            UreqTransport::new(Duration::from_millis(config.http.timeout_ms)),
            handler,
        )
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    /// Perform one request. Non-2xx responses and transport failures are
    /// handled (logged, reported, notified) and then returned as `Err`.
    pub async fn call(
        &self,
        url: &str,
        request: HttpRequest,
        mut context: Context,
    ) -> Result<HttpResponse, Failure> {
        let method = request.method;

        let transport = Arc::clone(&self.transport);
        let target = url.to_string();
        let outcome = tokio::task::spawn_blocking(move || transport.execute(&target, &request))
            .await
            .unwrap_or_else(|e| Err(Failure::new(format!("request task failed: {e}"))));

        let failure = match outcome {
            Ok(response) if response.is_success() => {
                debug!(url, method = %method, status = response.status, "Request succeeded");
                return Ok(response);
            }
            Ok(response) => failure_from_response(&response),
            Err(failure) => with_connectivity_message(failure),
        };

        context.insert("url".to_string(), Value::from(url));
        context.insert("method".to_string(), Value::from(method.as_str()));
        self.handler
            .handle(failure.clone(), context, HandleOptions::default());
        Err(failure)
    }
}

fn with_connectivity_message(failure: Failure) -> Failure {
    let connectivity = matches!(
        failure.name,
        Some(FailureName::NetworkError | FailureName::TypeError)
    );
    if connectivity && failure.user_message().is_none() {
        failure.with_user_message(CONNECTIVITY_MESSAGE)
    } else {
        failure
    }
}
