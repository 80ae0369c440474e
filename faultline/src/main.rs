//! Faultline command line
//!
//! Inspects the persisted error log, classifies failures, and runs HTTP
//! requests through the same handling and retry path an application uses.

#![forbid(unsafe_code)]

mod commands;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use faultline_common::{
    Context, ErrorHandler, Failure, FaultInterceptor, FaultlineConfig, LogConfig,
    Method, init_logging,
};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "faultline")]
#[command(author, version, about = "Faultline - client-side error handling toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/faultline/config.toml)
    #[arg(short, long, global = true, env = "FAULTLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or clear the persisted error log
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// Classify a failure and print the message a user would see
    Classify {
        #[command(flatten)]
        failure: FailureArgs,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Handle a failure: log, persist, report and notify
    Handle {
        #[command(flatten)]
        failure: FailureArgs,

        /// Extra context as a JSON object
        #[arg(long, value_parser = parse_context)]
        context: Option<Context>,

        /// Skip the notification
        #[arg(long)]
        silent: bool,

        /// Notification duration in milliseconds (0 keeps it until dismissed)
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Require acknowledgement
        #[arg(long)]
        modal: Option<bool>,
    },

    /// Perform an HTTP request with failure handling and retry
    Fetch {
        url: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: Method,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,

        /// Extra header as "Name: value"
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Retries after the first attempt (default from config)
        #[arg(long)]
        retries: Option<u32>,

        /// Base backoff delay in milliseconds (default from config)
        #[arg(long)]
        base_delay_ms: Option<u64>,
    },

    /// Print the effective configuration
    Config {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Panic with the given message to exercise the panic hook
    #[command(hide = true)]
    SimulatePanic { message: String },
}

#[derive(Subcommand)]
enum LogsAction {
    /// List stored entries, oldest first
    List {
        /// Show only the newest N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value_t = ListFormat::Pretty)]
        format: ListFormat,
    },

    /// Remove every stored entry
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListFormat {
    Pretty,
    Json,
}

/// Fields of a failure envelope.
#[derive(Args, Debug, Clone, Default)]
pub struct FailureArgs {
    /// Failure name, e.g. NetworkError or TimeoutError
    #[arg(long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub message: Option<String>,

    /// HTTP-like status code
    #[arg(long)]
    pub status: Option<u16>,

    /// Validation payload as JSON
    #[arg(long, value_parser = parse_json)]
    pub validation: Option<Value>,

    /// Error collection as JSON
    #[arg(long, value_parser = parse_json)]
    pub errors: Option<Value>,

    /// Message written for end users
    #[arg(long)]
    pub user_message: Option<String>,
}

impl FailureArgs {
    pub fn to_failure(&self) -> Failure {
        Failure {
            name: self.name.as_deref().map(Into::into),
            message: self.message.clone(),
            status: self.status,
            validation: self.validation.clone(),
            errors: self.errors.clone(),
            user_message: self.user_message.clone(),
            ..Failure::default()
        }
    }
}

fn parse_json(value: &str) -> Result<Value, String> {
    serde_json::from_str(value).map_err(|e| format!("invalid JSON: {e}"))
}

fn parse_context(value: &str) -> Result<Context, String> {
    match parse_json(value)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("context must be a JSON object, got {other}")),
    }
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    let (name, val) = value
        .split_once(':')
        .ok_or_else(|| format!("header must look like 'Name: value', got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok((name.to_string(), val.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Diagnostics stay off unless asked for; the banner is the user surface.
    let mut log_config = LogConfig::from_env("off").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let config = FaultlineConfig::load(cli.config.as_deref()).context("loading config")?;
    debug!(store = ?config.log_store.resolved_path(), "Configuration loaded");

    let handler = Arc::new(ErrorHandler::from_config(&config));
    FaultInterceptor::new(Arc::clone(&handler)).install();

    let outcome = match cli.command {
        Commands::Logs { action } => match action {
            LogsAction::List { limit, format } => {
                commands::list_logs(&handler, limit, format == ListFormat::Json)
            }
            LogsAction::Clear => commands::clear_logs(&handler),
        },
        Commands::Classify { failure, json } => {
            commands::classify(&handler, &failure.to_failure(), json)
        }
        Commands::Handle {
            failure,
            context,
            silent,
            duration_ms,
            modal,
        } => commands::handle(
            &handler,
            failure.to_failure(),
            context.unwrap_or_default(),
            commands::handle_options(silent, duration_ms, modal),
        ),
        Commands::Fetch {
            url,
            method,
            data,
            headers,
            retries,
            base_delay_ms,
        } => {
            let request = commands::FetchRequest {
                url,
                method,
                data,
                headers,
            };
            let policy = commands::retry_policy(&config, retries, base_delay_ms);
            commands::fetch(&config, Arc::clone(&handler), request, &policy).await
        }
        Commands::Config { json } => commands::print_config(&config, json),
        Commands::SimulatePanic { message } => panic!("{message}"),
    };

    // Persistence and reports run in the background; let them land.
    handler.flush().await;
    outcome
}
