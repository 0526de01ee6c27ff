//! Deterministic replay of captured compiler output.

use super::scheduler::{TaskOutcome, TaskStatus};
use crate::error::{BuildError, EXIT_SUCCESS};
use crate::logging::{LogSink, Severity};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCounts {
    pub compiled: usize,
    pub failed: usize,
}

/// Writes each outcome as one contiguous block: a header, then the unit's
/// captured lines at their own severity. Ends with a one-line tally.
pub struct LogAggregator<'a> {
    sink: &'a dyn LogSink,
}

impl<'a> LogAggregator<'a> {
    pub fn new(sink: &'a dyn LogSink) -> Self {
        Self { sink }
    }

    pub fn replay(&self, outcomes: &[TaskOutcome]) -> ReplayCounts {
        let mut counts = ReplayCounts::default();
        for outcome in outcomes {
            let path = outcome.unit.display_path();
            match &outcome.status {
                TaskStatus::Succeeded => {
                    counts.compiled += 1;
                    self.sink.emit(
                        Severity::Info,
                        &format!("Compiled {} ({:.2?})", path, outcome.elapsed),
                    );
                }
                TaskStatus::Failed { exit_code } => {
                    counts.failed += 1;
                    self.sink.emit(
                        Severity::Error,
                        &format!("Failed to compile {} (exit code {})", path, exit_code),
                    );
                }
                TaskStatus::LaunchFailed { .. } => {
                    counts.failed += 1;
                    self.sink.emit(
                        Severity::Error,
                        &format!("Failed to compile {} (compiler did not run)", path),
                    );
                }
            }
            for line in &outcome.lines {
                self.sink.emit(line.severity, &line.text);
            }
        }
        self.sink.emit(
            Severity::Info,
            &format!("{} unit(s) compiled, {} failed", counts.compiled, counts.failed),
        );
        counts
    }
}

/// Totals for one build invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub compiled: usize,
    pub failed: usize,
    /// Units abandoned at the deadline.
    pub not_completed: usize,
    pub up_to_date: usize,
    pub timed_out: bool,
    pub timeout_ms: u64,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_completed == 0 && !self.timed_out
    }

    pub fn status_line(&self) -> String {
        let verdict = if self.timed_out {
            "Build timed out"
        } else if self.failed > 0 || self.not_completed > 0 {
            "Build failed"
        } else {
            "Build finished"
        };
        format!(
            "{} in {:.2?}: {} compiled, {} failed, {} skipped, {} up to date",
            verdict, self.elapsed, self.compiled, self.failed, self.not_completed, self.up_to_date
        )
    }

    pub fn exit_code(&self) -> i32 {
        match self.to_error() {
            Some(e) => e.exit_code(),
            None => EXIT_SUCCESS,
        }
    }

    /// The error this summary should end the build with, if any.
    /// A timeout outranks individual failures. Without a timeout, a unit
    /// that never reported back counts as failed.
    pub fn to_error(&self) -> Option<BuildError> {
        if self.timed_out {
            Some(BuildError::Timeout {
                timeout_ms: self.timeout_ms,
                completed: self.compiled + self.failed,
                pending: self.not_completed,
            })
        } else if self.failed > 0 || self.not_completed > 0 {
            Some(BuildError::CompilationFailed {
                failed: self.failed + self.not_completed,
                total: self.compiled + self.failed + self.not_completed,
            })
        } else {
            None
        }
    }
}
