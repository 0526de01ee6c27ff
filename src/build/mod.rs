//! The compile pipeline: staleness, scheduling, and output replay.

mod core;
pub mod process;
pub mod report;
pub mod scheduler;
pub mod stale;

pub use core::{BuildEnv, analyze, build_project, stale_units};
pub use process::{ProcessOutput, ProcessRunner, SystemRunner};
pub use report::{BuildSummary, LogAggregator, ReplayCounts};
pub use scheduler::{CompilationScheduler, Invocation, ScheduleReport, TaskOutcome, TaskStatus};
pub use stale::{OutputLayout, SourceUnit, StaleScan, StalenessAnalyzer};
