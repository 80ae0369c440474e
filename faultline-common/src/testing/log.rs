//! Per-test JSONL traces.
//!
//! With `FAULTLINE_TEST_LOGGING=1` (or under `CI`), [`test_guard!`] writes
//! `target/test-logs/<test>.jsonl` with a start line and a pass or fail line.
//!
//! [`test_guard!`]: crate::test_guard

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Instant;
use tracing_subscriber::prelude::*;

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Route `tracing` output through the test writer. Safe to call repeatedly.
///
/// `FAULTLINE_TEST_LOG_LEVEL` sets the level (default `info`).
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let level =
            std::env::var("FAULTLINE_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = tracing_subscriber::EnvFilter::try_new(format!(
            "faultline={level},faultline_common={level}"
        ))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .compact();
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Start,
    Pass,
    Fail,
}

#[derive(Debug, Serialize)]
struct TraceLine<'a> {
    timestamp: String,
    test: &'a str,
    outcome: Outcome,
    elapsed_ms: u64,
}

struct Trace {
    test: String,
    started: Instant,
    file: Option<File>,
}

impl Trace {
    fn open(test: &str) -> Self {
        let dir = target_dir().join("test-logs");
        let file = std::fs::create_dir_all(&dir)
            .and_then(|()| File::create(dir.join(format!("{}.jsonl", test.replace("::", "_")))))
            .ok();
        let mut trace = Self {
            test: test.to_string(),
            started: Instant::now(),
            file,
        };
        trace.write(Outcome::Start);
        trace
    }

    fn write(&mut self, outcome: Outcome) {
        let line = TraceLine {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test: &self.test,
            outcome,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };
        tracing::info!(test = %self.test, ?outcome, elapsed_ms = line.elapsed_ms, "test trace");
        if let Some(file) = self.file.as_mut()
            && let Ok(json) = serde_json::to_string(&line)
        {
            let _ = writeln!(file, "{json}");
        }
    }
}

fn target_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(dir);
    }
    let mut cwd = std::env::current_dir().unwrap_or_default();
    loop {
        if cwd.join("target").is_dir() {
            return cwd.join("target");
        }
        if !cwd.pop() {
            return PathBuf::from("target");
        }
    }
}

/// Records pass or fail for the enclosing test when dropped.
///
/// Does nothing unless `FAULTLINE_TEST_LOGGING` is `1`/`true`, or `CI` is set
/// and the flag is not `0`/`false`.
pub struct TestGuard {
    trace: Option<Trace>,
}

impl TestGuard {
    pub fn new(test: &str) -> Self {
        let trace = Self::is_enabled().then(|| {
            init_global_test_logging();
            Trace::open(test)
        });
        Self { trace }
    }

    fn is_enabled() -> bool {
        match std::env::var("FAULTLINE_TEST_LOGGING").as_deref() {
            Ok("1" | "true") => true,
            Ok("0" | "false") => false,
            _ => std::env::var("CI").is_ok(),
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        if let Some(trace) = self.trace.as_mut() {
            let outcome = if std::thread::panicking() {
                Outcome::Fail
            } else {
                Outcome::Pass
            };
            trace.write(outcome);
        }
    }
}

/// Create a [`TestGuard`] named after the enclosing function.
#[macro_export]
macro_rules! test_guard {
    () => {{
        fn _f() {}
        fn _type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = _type_name_of(_f);
        let name = name.strip_suffix("::_f").unwrap_or(name);
        let name = name.rsplit("::").next().unwrap_or(name);
        $crate::testing::TestGuard::new(name)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_line_shape() {
        let line = TraceLine {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            test: "test_example",
            outcome: Outcome::Fail,
            elapsed_ms: 42,
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["outcome"], "fail");
        assert_eq!(json["elapsed_ms"], 42);
        assert_eq!(json["test"], "test_example");
    }

    #[test]
    fn test_trace_file_records_start_and_pass() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("trace.jsonl");
        let mut trace = Trace {
            test: "test_trace".to_string(),
            started: Instant::now(),
            file: File::create(&path).ok(),
        };
        trace.write(Outcome::Start);
        trace.write(Outcome::Pass);
        drop(trace);

        let contents = std::fs::read_to_string(&path).unwrap();
        let outcomes: Vec<String> = contents
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["outcome"].to_string())
            .collect();
        assert_eq!(outcomes, [r#""start""#, r#""pass""#]);
    }

    #[test]
    fn test_guard_macro_names_function() {
        let guard = crate::test_guard!();
        drop(guard);
    }
}
