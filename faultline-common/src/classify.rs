//! Failure classification.
//!
//! A failure is run through a fixed, ordered list of capability probes. The
//! first probe that recognizes the failure decides both the kind and the
//! severity; the order is part of the contract (a `TimeoutError` with a 500
//! status is a timeout, not a server error).

use crate::errors::{Classification, ErrorKind, Failure, FailureName, Severity};
use tracing::trace;

type Probe = fn(&Failure) -> Option<Classification>;

/// Ordered probes. First match wins.
const PROBES: [(&str, Probe); 4] = [
    ("network", probe_network),
    ("timeout", probe_timeout),
    ("status", probe_status),
    ("validation", probe_validation),
];

/// Classify a failure. Total: every input yields a classification.
pub fn classify(failure: &Failure) -> Classification {
    for (probe_name, probe) in PROBES {
        if let Some(classification) = probe(failure) {
            trace!(
                probe = probe_name,
                kind = %classification.kind,
                severity = %classification.severity,
                "Failure classified"
            );
            return classification;
        }
    }
    Classification::UNKNOWN
}

/// Classify a possibly absent failure; absence is `unknown/medium`.
pub fn classify_opt(failure: Option<&Failure>) -> Classification {
    failure.map(classify).unwrap_or(Classification::UNKNOWN)
}

// A type error raised from a fetch-style call is a network failure; a bare
// type error is treated the same way.
fn probe_network(failure: &Failure) -> Option<Classification> {
    matches!(
        failure.name,
        Some(FailureName::NetworkError | FailureName::TypeError)
    )
    .then_some(Classification::new(ErrorKind::Network, Severity::High))
}

fn probe_timeout(failure: &Failure) -> Option<Classification> {
    let named = matches!(failure.name, Some(FailureName::TimeoutError));
    let mentioned = failure.message().is_some_and(|m| m.contains("timeout"));
    (named || mentioned).then_some(Classification::new(ErrorKind::Timeout, Severity::Medium))
}

fn probe_status(failure: &Failure) -> Option<Classification> {
    let status = failure.status()?;
    let classification = match status {
        500.. => Classification::new(ErrorKind::Server, Severity::High),
        404 => Classification::new(ErrorKind::NotFound, Severity::Medium),
        401 | 403 => Classification::new(ErrorKind::Permission, Severity::High),
        _ => Classification::new(ErrorKind::Api, Severity::Medium),
    };
    Some(classification)
}

fn probe_validation(failure: &Failure) -> Option<Classification> {
    failure
        .has_validation_shape()
        .then_some(Classification::new(ErrorKind::Validation, Severity::Low))
}
