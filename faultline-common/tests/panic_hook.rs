//! Panic hook installation runs in its own test binary so the process-wide
//! hook does not leak into the library's unit tests.

use faultline_common::testing::RecordingPresenter;
use faultline_common::{ErrorHandler, ErrorKind, FaultInterceptor, LogStore, Notifier};
use std::sync::Arc;

#[test]
fn test_panic_hook_routes_panics_once() {
    let presenter = RecordingPresenter::new();
    let handler = ErrorHandler::new(Arc::new(LogStore::in_memory()))
        .with_notifier(Notifier::new().with_presenter(Arc::new(presenter.clone())));
    let interceptor = FaultInterceptor::new(Arc::new(handler));

    assert!(interceptor.install());
    assert!(FaultInterceptor::is_installed());
    assert!(!interceptor.install(), "second install must be a no-op");

    let result = std::panic::catch_unwind(|| {
        panic!("widget exploded");
    });
    assert!(result.is_err());

    let logs = interceptor.handler().error_logs();
    assert_eq!(logs.len(), 1, "exactly one entry per panic: {logs:?}");
    assert_eq!(logs[0].message, "widget exploded");
    assert_eq!(logs[0].kind, ErrorKind::Unknown);
    assert!(
        logs[0].context["filename"]
            .as_str()
            .is_some_and(|f| f.ends_with("panic_hook.rs")),
        "unexpected context {:?}",
        logs[0].context
    );
    assert!(logs[0].context["line"].as_u64().is_some());

    let shown = presenter.requests();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].message, "widget exploded");
}
