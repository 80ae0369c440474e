//! Closed classification tags: [`ErrorKind`] and [`Severity`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin or nature of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity failure before any response was received
    Network,
    /// Request reached the service but was rejected (non-specific status)
    Api,
    /// Input failed validation
    Validation,
    /// Caller is not authenticated or not authorized (401/403)
    Permission,
    /// Resource does not exist (404)
    NotFound,
    /// Service-side failure (5xx)
    Server,
    /// Operation did not complete in time
    Timeout,
    /// Nothing more specific could be determined
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Network,
        ErrorKind::Api,
        ErrorKind::Validation,
        ErrorKind::Permission,
        ErrorKind::NotFound,
        ErrorKind::Server,
        ErrorKind::Timeout,
        ErrorKind::Unknown,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Api => "api",
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds treated as transient by default.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Server)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ParseTaxonomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseTaxonomyError::Kind(s.to_string()))
    }
}

/// Urgency of a failure, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseTaxonomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str() == normalized)
            .ok_or_else(|| ParseTaxonomyError::Severity(s.to_string()))
    }
}

/// Unrecognized kind or severity name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTaxonomyError {
    #[error("unknown error kind '{0}'")]
    Kind(String),
    #[error("unknown severity '{0}'")]
    Severity(String),
}

/// Result of classifying one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub severity: Severity,
}

impl Classification {
    pub const fn new(kind: ErrorKind, severity: Severity) -> Self {
        Self { kind, severity }
    }

    /// The fallback classification for anything unrecognized.
    pub const UNKNOWN: Classification = Classification::new(ErrorKind::Unknown, Severity::Medium);
}

impl Default for Classification {
    fn default() -> Self {
        Self::UNKNOWN
    }
}
