//! Subcommand implementations.

use anyhow::Result;
use console::style;
use faultline_common::{
    Context, ErrorHandler, Failure, FaultlineConfig, HandleOptions, HttpRequest, LogEntry, Method,
    NetworkClient, RetryEvent, RetryPolicy, Severity, retry_with,
};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn list_logs(handler: &ErrorHandler, limit: Option<usize>, json: bool) -> Result<ExitCode> {
    let entries = match limit {
        Some(limit) => handler.store().recent(limit),
        None => handler.error_logs(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    if entries.is_empty() {
        println!("No errors logged.");
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &entries {
        println!("{}", render_entry(entry));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_entry(entry: &LogEntry) -> String {
    let severity = style(format!("{:<8}", entry.severity.as_str()));
    let severity = match entry.severity {
        Severity::Low => severity.cyan(),
        Severity::Medium => severity.yellow(),
        Severity::High | Severity::Critical => severity.red(),
    };
    format!(
        "{} {} {:<10} {}",
        style(&entry.timestamp).dim(),
        severity,
        entry.kind.as_str(),
        entry.message
    )
}

pub fn clear_logs(handler: &ErrorHandler) -> Result<ExitCode> {
    let count = handler.store().len();
    handler.clear_error_logs();
    println!("Cleared {count} error log entries.");
    Ok(ExitCode::SUCCESS)
}

pub fn classify(handler: &ErrorHandler, failure: &Failure, json: bool) -> Result<ExitCode> {
    let classification = faultline_common::classify(failure);
    let user_message = handler.templates().format(failure, classification);

    if json {
        let out = json!({
            "kind": classification.kind,
            "severity": classification.severity,
            "userMessage": user_message,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("kind:     {}", classification.kind);
        println!("severity: {}", classification.severity);
        println!("message:  {user_message}");
    }
    Ok(ExitCode::SUCCESS)
}

pub fn handle_options(
    silent: bool,
    duration_ms: Option<u64>,
    modal: Option<bool>,
) -> HandleOptions {
    let mut options = HandleOptions {
        silent,
        ..HandleOptions::default()
    };
    if let Some(ms) = duration_ms {
        options = options.with_duration(Duration::from_millis(ms));
    }
    if let Some(modal) = modal {
        options = options.with_modal(modal);
    }
    options
}

pub fn handle(
    handler: &ErrorHandler,
    failure: Failure,
    context: Context,
    options: HandleOptions,
) -> Result<ExitCode> {
    let handled = handler.handle(failure, context, options);
    println!(
        "{}/{}: {}",
        handled.classification.kind, handled.classification.severity, handled.user_message
    );
    Ok(ExitCode::SUCCESS)
}

pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub data: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    fn to_http(&self) -> HttpRequest {
        let mut request = HttpRequest::new(self.method);
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        if let Some(data) = &self.data {
            request = request.with_body(data.clone().into_bytes());
        }
        request
    }
}

pub fn retry_policy(
    config: &FaultlineConfig,
    retries: Option<u32>,
    base_delay_ms: Option<u64>,
) -> RetryPolicy {
    let mut policy = RetryPolicy::from(&config.retry);
    if let Some(retries) = retries {
        policy = policy.with_max_retries(retries);
    }
    if let Some(ms) = base_delay_ms {
        policy = policy.with_base_delay(Duration::from_millis(ms));
    }
    policy
}

pub async fn fetch(
    config: &FaultlineConfig,
    handler: Arc<ErrorHandler>,
    request: FetchRequest,
    policy: &RetryPolicy,
) -> Result<ExitCode> {
    let client = NetworkClient::from_config(config, handler);
    let outcome = retry_with(
        policy,
        || client.call(&request.url, request.to_http(), Context::new()),
        |event: RetryEvent<'_, Failure>| {
            eprintln!(
                "{} {} failed, retry {}/{} in {}ms",
                style("retry").yellow().bold(),
                event.classification.kind,
                event.attempt,
                event.max_retries,
                event.delay.as_millis()
            );
        },
    )
    .await;

    match outcome {
        Ok(response) => {
            info!(url = %request.url, status = response.status, "Fetch succeeded");
            println!("{}", response.text());
            Ok(ExitCode::SUCCESS)
        }
        // Already logged and shown by the handler.
        Err(failure) => {
            let kind = faultline_common::classify(&failure).kind;
            eprintln!("{} {kind}: {failure}", style("failed").red().bold());
            Ok(ExitCode::FAILURE)
        }
    }
}

pub fn print_config(config: &FaultlineConfig, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(ExitCode::SUCCESS)
}
