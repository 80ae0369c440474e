//! User-facing message formatting.

use crate::errors::{Classification, ErrorKind, Failure};
use std::collections::HashMap;

/// Terms that mark a message as transport noise rather than something a user
/// can act on.
const TRANSPORT_TERMS: [&str; 2] = ["fetch", "Network"];

/// Per-kind fallback message templates.
///
/// The default set is English; replace individual templates with
/// [`MessageTemplates::with_template`] to localize.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    templates: HashMap<ErrorKind, String>,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        let templates = ErrorKind::ALL
            .into_iter()
            .map(|kind| (kind, default_template(kind).to_string()))
            .collect();
        Self { templates }
    }
}

impl MessageTemplates {
    /// Override the template for one kind.
    #[must_use]
    pub fn with_template(mut self, kind: ErrorKind, text: impl Into<String>) -> Self {
        self.templates.insert(kind, text.into());
        self
    }

    /// Template text for a kind.
    pub fn template(&self, kind: ErrorKind) -> &str {
        self.templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(kind))
    }

    /// Produce the message shown to the user for a classified failure.
    ///
    /// Precedence: the failure's `user_message`, then its own message unless
    /// it mentions transport internals, then the kind template. Validation
    /// failures prefer their raw message over the template.
    pub fn format(&self, failure: &Failure, classification: Classification) -> String {
        if let Some(user_message) = failure.user_message() {
            return user_message.to_string();
        }

        if let Some(message) = failure.message() {
            if !mentions_transport(message) {
                return message.to_string();
            }
            if classification.kind == ErrorKind::Validation {
                return message.to_string();
            }
        }

        self.template(classification.kind).to_string()
    }
}

fn mentions_transport(message: &str) -> bool {
    TRANSPORT_TERMS.iter().any(|term| message.contains(term))
}

fn default_template(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => {
            "Unable to reach the network. Check your connection and try again."
        }
        ErrorKind::Timeout => "The request timed out. Please try again.",
        ErrorKind::Server => "The server ran into a problem. We are already working on a fix.",
        ErrorKind::NotFound => "The requested resource was not found.",
        ErrorKind::Permission => {
            "You do not have access to this resource. Check your permissions."
        }
        ErrorKind::Api => "The request could not be completed. Please try again later.",
        ErrorKind::Validation => "Please check the data you entered.",
        ErrorKind::Unknown => "An unexpected error occurred. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::errors::{FailureName, Severity};
    use serde_json::json;

    fn format(failure: &Failure) -> String {
        MessageTemplates::default().format(failure, classify(failure))
    }

    #[test]
    fn test_user_message_wins() {
        let failure = Failure::network("Failed to fetch").with_user_message("Server is offline");
        assert_eq!(format(&failure), "Server is offline");
    }

    #[test]
    fn test_empty_user_message_falls_through() {
        let failure = Failure::default().with_status(404).with_user_message("");
        assert_eq!(format(&failure), "The requested resource was not found.");

        let failure = Failure::http(409, "Name already taken").with_user_message("");
        assert_eq!(format(&failure), "Name already taken");
    }

    #[test]
    fn test_plain_message_used_verbatim() {
        let failure = Failure::http(409, "Name already taken");
        assert_eq!(format(&failure), "Name already taken");
    }

    #[test]
    fn test_transport_message_replaced_by_template() {
        let failure = Failure::new("Failed to fetch").with_name(FailureName::TypeError);
        assert_eq!(format(&failure), default_template(ErrorKind::Network));

        let failure = Failure::http(500, "NetworkError when attempting to reach resource");
        assert_eq!(format(&failure), default_template(ErrorKind::Server));
    }

    #[test]
    fn test_bare_404_uses_not_found_template() {
        let failure = Failure::default().with_status(404);
        assert_eq!(format(&failure), "The requested resource was not found.");
    }

    #[test]
    fn test_validation_prefers_raw_message() {
        let failure = Failure::new("fetch field must be set").with_errors(json!(["fetch"]));
        let c = Classification::new(ErrorKind::Validation, Severity::Low);
        assert_eq!(
            MessageTemplates::default().format(&failure, c),
            "fetch field must be set"
        );
    }

    #[test]
    fn test_validation_without_message_uses_template() {
        let failure = Failure::validation(json!({"email": "required"}));
        assert_eq!(format(&failure), "Please check the data you entered.");
    }

    #[test]
    fn test_every_kind_has_distinct_template() {
        let templates = MessageTemplates::default();
        let mut seen: Vec<&str> = ErrorKind::ALL
            .into_iter()
            .map(|kind| templates.template(kind))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn test_template_override() {
        let templates =
            MessageTemplates::default().with_template(ErrorKind::NotFound, "Nicht gefunden.");
        let failure = Failure::default().with_status(404);
        assert_eq!(templates.format(&failure, classify(&failure)), "Nicht gefunden.");
        assert_eq!(
            templates.template(ErrorKind::Server),
            default_template(ErrorKind::Server)
        );
    }
}
