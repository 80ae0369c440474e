//! Environment variable parsing with type safety.
//!
//! Every variable carries the `FAULTLINE_` prefix. Parse failures fall back
//! to the supplied default and are collected so they can be reported
//! together.

use super::source::{ConfigSource, Sourced};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "FAULTLINE_";

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    pub fn new() -> Self {
        Self {
            prefix: ENV_PREFIX,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match parse_bool(&value) {
                Some(parsed) => Sourced::from_env(parsed, var_name),
                None => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "boolean (true/false/1/0/yes/no)".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        self.get_range(name, default, min, max, "unsigned 32-bit integer")
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        self.get_range(name, default, min, max, "unsigned 64-bit integer")
    }

    fn get_range<T>(&mut self, name: &str, default: T, min: T, max: T, expected: &str) -> Sourced<T>
    where
        T: FromStr + PartialOrd + ToString,
    {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.trim().parse::<T>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name,
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::default_value(default)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: expected.to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get any `FromStr` value; `expected` describes valid input in errors.
    pub fn get_parsed<T: FromStr>(&mut self, name: &str, default: T, expected: &str) -> Sourced<T> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<T>() {
                Ok(parsed) => Sourced::from_env(parsed, var_name),
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: expected.to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a path value with `~/` expansion.
    pub fn get_path(&mut self, name: &str, default: Option<PathBuf>) -> Sourced<Option<PathBuf>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(expand_home(&value)), var_name),
            Err(_) => Sourced {
                value: default,
                source: ConfigSource::Default,
                env_var: None,
            },
        }
    }

    /// Get a comma-separated list of `FromStr` values. Any invalid item
    /// rejects the whole list.
    pub fn get_parsed_list<T: FromStr>(
        &mut self,
        name: &str,
        default: Vec<T>,
        expected: &str,
    ) -> Sourced<Vec<T>> {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return Sourced::default_value(default);
        };
        let parsed: Result<Vec<T>, _> = parse_string_list(&value)
            .iter()
            .map(|item| item.parse::<T>())
            .collect();
        match parsed {
            Ok(items) => Sourced::from_env(items, var_name),
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: expected.to_string(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_string_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/").zip(dirs::home_dir()) {
        Some((stripped, home)) => home.join(stripped),
        None => PathBuf::from(value),
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;
    use crate::errors::{ErrorKind, Severity};

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: serialized via env_test_lock
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: serialized via env_test_lock
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn test_get_bool_true_values() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_BOOL_TRUE"];
        cleanup_env(&vars);

        for val in &["1", "true", "yes", "on", "TRUE", "Yes"] {
            set_env("FAULTLINE_TEST_BOOL_TRUE", val);
            let mut parser = EnvParser::new();
            let result = parser.get_bool("TEST_BOOL_TRUE", false);
            assert!(result.value, "Expected true for '{}'", val);
            assert!(!parser.has_errors());
        }

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_bool_invalid_uses_default() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_BAD_BOOL"];
        cleanup_env(&vars);

        set_env("FAULTLINE_BAD_BOOL", "maybe");
        let mut parser = EnvParser::new();
        let result = parser.get_bool("BAD_BOOL", false);
        assert!(!result.value);
        assert!(!result.is_from_env());
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u64_range() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_U64"];
        cleanup_env(&vars);

        set_env("FAULTLINE_TEST_U64", "50");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 10, 0, 100).value, 50);
        assert!(!parser.has_errors());

        set_env("FAULTLINE_TEST_U64", "200");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 10, 0, 100).value, 10);
        assert!(matches!(parser.errors()[0], EnvError::OutOfRange { .. }));

        set_env("FAULTLINE_TEST_U64", "lots");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 10, 0, 100).value, 10);
        assert!(matches!(parser.errors()[0], EnvError::InvalidValue { .. }));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_parsed_taxonomy() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_SEVERITY"];
        cleanup_env(&vars);

        set_env("FAULTLINE_TEST_SEVERITY", "critical");
        let mut parser = EnvParser::new();
        let result = parser.get_parsed("TEST_SEVERITY", Severity::High, "severity");
        assert_eq!(result.value, Severity::Critical);

        set_env("FAULTLINE_TEST_SEVERITY", "catastrophic");
        let mut parser = EnvParser::new();
        let result = parser.get_parsed("TEST_SEVERITY", Severity::High, "severity");
        assert_eq!(result.value, Severity::High);
        assert_eq!(parser.take_errors().len(), 1);
        assert!(!parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_parsed_list() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_KINDS"];
        cleanup_env(&vars);

        set_env("FAULTLINE_TEST_KINDS", "network, not-found");
        let mut parser = EnvParser::new();
        let result = parser.get_parsed_list::<ErrorKind>("TEST_KINDS", vec![], "error kinds");
        assert_eq!(result.value, vec![ErrorKind::Network, ErrorKind::NotFound]);

        set_env("FAULTLINE_TEST_KINDS", "network,bogus");
        let mut parser = EnvParser::new();
        let result =
            parser.get_parsed_list("TEST_KINDS", vec![ErrorKind::Server], "error kinds");
        assert_eq!(result.value, vec![ErrorKind::Server]);
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_path_expands_home() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_PATH"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_path("TEST_PATH", None).value, None);

        set_env("FAULTLINE_TEST_PATH", "/tmp/faultline/errors.json");
        let mut parser = EnvParser::new();
        let result = parser.get_path("TEST_PATH", None);
        assert_eq!(result.value, Some(PathBuf::from("/tmp/faultline/errors.json")));
        assert_eq!(result.env_var.as_deref(), Some("FAULTLINE_TEST_PATH"));

        if let Some(home) = dirs::home_dir() {
            set_env("FAULTLINE_TEST_PATH", "~/errors.json");
            let mut parser = EnvParser::new();
            assert_eq!(
                parser.get_path("TEST_PATH", None).value,
                Some(home.join("errors.json"))
            );
        }

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_string() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_OPT"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert!(parser.get_optional_string("TEST_OPT").value.is_none());

        set_env("FAULTLINE_TEST_OPT", "");
        let mut parser = EnvParser::new();
        let result = parser.get_optional_string("TEST_OPT");
        assert!(result.value.is_none());
        assert!(result.is_from_env());

        set_env("FAULTLINE_TEST_OPT", "value");
        let mut parser = EnvParser::new();
        assert_eq!(
            parser.get_optional_string("TEST_OPT").value,
            Some("value".to_string())
        );

        cleanup_env(&vars);
    }

    #[test]
    fn test_source_tracking() {
        let _guard = env_test_lock();
        let vars = ["FAULTLINE_TEST_SRC"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.source, ConfigSource::Default);
        assert!(result.env_var.is_none());

        set_env("FAULTLINE_TEST_SRC", "from_env");
        let mut parser = EnvParser::new();
        let result = parser.get_string("TEST_SRC", "default");
        assert_eq!(result.source, ConfigSource::Environment);
        assert_eq!(result.env_var.as_deref(), Some("FAULTLINE_TEST_SRC"));

        cleanup_env(&vars);
    }

    mod proptest_parsing {
        use super::super::{parse_bool, parse_string_list};
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn test_parse_bool_valid_only(s in "[a-zA-Z0-9_-]{0,20}") {
                let valid = ["1", "true", "yes", "on", "0", "false", "no", "off", ""];
                let is_valid = valid.iter().any(|v| s.eq_ignore_ascii_case(v));
                prop_assert_eq!(parse_bool(&s).is_some(), is_valid);
            }

            #[test]
            fn test_parse_string_list_separators(
                items in prop::collection::vec("[a-zA-Z0-9]+", 0..10)
            ) {
                let input = items.join(" , ");
                prop_assert_eq!(parse_string_list(&input), items);
            }
        }
    }
}
