//! Bounded-parallel compiler invocations with an aggregate deadline.
//!
//! Every unit becomes one task on a dedicated rayon pool. Results travel back
//! over a channel tagged with the unit's submission index and are slotted
//! into place, so the report order never depends on completion order.
//!
//! When the deadline passes the scheduler stops waiting and raises an
//! abandon flag. Tasks not yet started skip their unit; processes already
//! running are left to finish and their results are dropped.

use super::process::ProcessRunner;
use super::stale::SourceUnit;
use crate::error::BuildError;
use crate::logging::{LogLine, Severity};
use crate::toolchain::ToolchainHandle;
use indicatif::ProgressBar;
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Argument template shared by every unit of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub checked: bool,
}

impl Invocation {
    /// `args`, then `-c` in checked mode, then `-o<output>` and the source.
    pub fn arguments(&self, unit: &SourceUnit) -> Vec<String> {
        let mut args = self.args.clone();
        if self.checked {
            args.push("-c".to_string());
        }
        args.push(format!("-o{}", unit.output.display()));
        args.push(unit.source.display().to_string());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed { exit_code: i32 },
    LaunchFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub unit: SourceUnit,
    pub lines: Vec<LogLine>,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    /// Completed tasks, in submission order.
    pub outcomes: Vec<TaskOutcome>,
    /// Units with no outcome when the deadline passed, in submission order.
    pub not_completed: Vec<SourceUnit>,
    pub timed_out: bool,
}

impl ScheduleReport {
    /// Every unit produced an outcome and every outcome succeeded.
    pub fn succeeded(&self) -> bool {
        !self.timed_out
            && self.not_completed.is_empty()
            && self.outcomes.iter().all(TaskOutcome::succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }
}

pub struct CompilationScheduler {
    runner: Arc<dyn ProcessRunner>,
    workers: usize,
    timeout: Option<Duration>,
    progress: Option<ProgressBar>,
}

impl CompilationScheduler {
    /// `workers == 0` uses one thread per logical CPU.
    pub fn new(runner: Arc<dyn ProcessRunner>, workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            runner,
            workers,
            timeout,
            progress: None,
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            rayon::current_num_threads()
        } else {
            self.workers
        }
    }

    pub fn run(
        &self,
        units: Vec<SourceUnit>,
        toolchain: &ToolchainHandle,
        invocation: &Invocation,
    ) -> Result<ScheduleReport, BuildError> {
        if units.is_empty() {
            return Ok(ScheduleReport::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count())
            .thread_name(|i| format!("relay-compile-{}", i))
            .panic_handler(|_| tracing::error!("compile worker panicked"))
            .build()
            .map_err(|e| BuildError::config(format!("failed to start worker pool: {}", e)))?;

        let total = units.len();
        let abandon = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<(usize, TaskOutcome)>();

        for (index, unit) in units.iter().enumerate() {
            let tx = tx.clone();
            let unit = unit.clone();
            let runner = Arc::clone(&self.runner);
            let executable = toolchain.executable.clone();
            let args = invocation.arguments(&unit);
            let abandon = Arc::clone(&abandon);

            pool.spawn(move || {
                if abandon.load(Ordering::SeqCst) {
                    return;
                }
                let outcome = run_task(runner.as_ref(), &executable, unit, args);
                // The receiver is gone once the deadline has passed.
                let _ = tx.send((index, outcome));
            });
        }
        drop(tx);

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut slots: Vec<Option<TaskOutcome>> = (0..total).map(|_| None).collect();
        let mut received = 0;
        let mut timed_out = false;

        while received < total {
            let message = match deadline {
                None => rx.recv().ok(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        timed_out = true;
                        break;
                    }
                    match rx.recv_timeout(deadline - now) {
                        Ok(message) => Some(message),
                        Err(RecvTimeoutError::Timeout) => {
                            timed_out = true;
                            break;
                        }
                        Err(RecvTimeoutError::Disconnected) => None,
                    }
                }
            };
            let Some((index, outcome)) = message else {
                break;
            };
            slots[index] = Some(outcome);
            received += 1;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        if timed_out {
            abandon.store(true, Ordering::SeqCst);
            tracing::warn!(
                "deadline reached with {} of {} unit(s) outstanding",
                total - received,
                total
            );
        }
        drop(rx);
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let mut report = ScheduleReport {
            timed_out,
            ..ScheduleReport::default()
        };
        for (slot, unit) in slots.into_iter().zip(units) {
            match slot {
                Some(outcome) => report.outcomes.push(outcome),
                None => report.not_completed.push(unit),
            }
        }
        Ok(report)
    }
}

fn run_task(
    runner: &dyn ProcessRunner,
    executable: &Path,
    unit: SourceUnit,
    args: Vec<String>,
) -> TaskOutcome {
    let start = Instant::now();
    let mut lines = vec![LogLine::new(
        Severity::Debug,
        format!("{} {}", executable.display(), args.join(" ")),
    )];

    if let Some(parent) = unit.output.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        let reason = format!("cannot create {}: {}", parent.display(), e);
        lines.push(LogLine::new(Severity::Error, reason.clone()));
        return TaskOutcome {
            unit,
            lines,
            status: TaskStatus::LaunchFailed { reason },
            elapsed: start.elapsed(),
        };
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        runner.execute(executable, &args, &unit.package_root)
    }));

    let status = match result {
        Ok(Ok(output)) => {
            let stderr_severity = if output.success() {
                Severity::Warn
            } else {
                Severity::Error
            };
            lines.extend(
                output
                    .stdout
                    .lines()
                    .map(|l| LogLine::new(Severity::Info, l)),
            );
            lines.extend(
                output
                    .stderr
                    .lines()
                    .map(|l| LogLine::new(stderr_severity, l)),
            );
            if output.success() {
                TaskStatus::Succeeded
            } else {
                TaskStatus::Failed {
                    exit_code: output.exit_code,
                }
            }
        }
        Ok(Err(e)) => {
            let reason = format!("failed to launch {}: {}", executable.display(), e);
            lines.push(LogLine::new(Severity::Error, reason.clone()));
            TaskStatus::LaunchFailed { reason }
        }
        Err(payload) => {
            let reason = format!("compiler task panicked: {}", panic_message(payload.as_ref()));
            lines.push(LogLine::new(Severity::Error, reason.clone()));
            TaskStatus::LaunchFailed { reason }
        }
    };

    TaskOutcome {
        unit,
        lines,
        status,
        elapsed: start.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
