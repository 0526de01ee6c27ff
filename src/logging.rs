//! Log severities, sinks, and tracing setup.
//!
//! Two channels exist side by side:
//!
//! - **Sinks** carry build output meant for the user: per-unit compiler
//!   output replayed by the [`LogAggregator`](crate::build::LogAggregator)
//!   and the final status line.
//! - **tracing** carries diagnostics (command lines, cache decisions),
//!   enabled with `-v` or `RUST_LOG`.

use colored::*;
use std::fmt;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single captured line with the severity it should be replayed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub severity: Severity,
    pub text: String,
}

impl LogLine {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

/// Destination for user-facing build output.
pub trait LogSink: Send + Sync {
    fn emit(&self, severity: Severity, line: &str);
}

/// Terminal sink: info to stdout, warnings and errors to stderr, debug to tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn emit(&self, severity: Severity, line: &str) {
        match severity {
            Severity::Debug => tracing::debug!("{}", line),
            Severity::Info => println!("   {}", line),
            Severity::Warn => eprintln!("{} {}", "!".yellow(), line),
            Severity::Error => eprintln!("{} {}", "x".red(), line),
        }
    }
}

/// Collects every emitted line in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<LogLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        match self.lines.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lines at exactly `severity`, text only.
    pub fn texts(&self, severity: Severity) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.severity == severity)
            .map(|l| l.text)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, severity: Severity, line: &str) {
        let entry = LogLine::new(severity, line);
        match self.lines.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `debug` over `warn`.
/// Only the first call takes effect.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "relay=debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}
