//! Test support: structured test logging and recording doubles for the
//! reporter, notifier and network transport.

mod doubles;
mod log;

pub use doubles::{FailingSink, RecordingPresenter, RecordingSink, ScriptedTransport};
pub use log::{TestGuard, init_global_test_logging};
