use super::process::ProcessRunner;
use super::report::{BuildSummary, LogAggregator};
use super::scheduler::{CompilationScheduler, Invocation};
use super::stale::{OutputLayout, SourceUnit, StaleScan, StalenessAnalyzer};
use crate::config::Project;
use crate::error::BuildError;
use crate::logging::{LogSink, Severity};
use crate::package::{Locate, Package};
use crate::toolchain::{Platform, Provision, VersionRequest};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Collaborators for one build, injected by the caller.
pub struct BuildEnv<'a> {
    pub platform: Platform,
    pub locator: &'a dyn Locate,
    pub provisioner: &'a dyn Provision,
    pub runner: Arc<dyn ProcessRunner>,
    pub sink: &'a dyn LogSink,
    /// Show a compile progress bar.
    pub progress: bool,
}

/// Stale units of every package, grouped by package in discovery order.
pub fn analyze(
    project: &Project,
    packages: &[Package],
) -> Result<Vec<(Package, StaleScan)>, BuildError> {
    let analyzer = StalenessAnalyzer::from_config(&project.config.build)?;
    let layout = OutputLayout::new(&project.base_dir, project.output_dir());
    let output_roots = layout.output_roots(packages)?;

    packages
        .par_iter()
        .zip(output_roots.par_iter())
        .map(|(package, output_root)| -> Result<(Package, StaleScan), BuildError> {
            let scan = analyzer.scan(package, output_root)?;
            Ok((package.clone(), scan))
        })
        .collect()
}

/// Locate packages and list what is stale without compiling anything.
pub fn stale_units(
    project: &Project,
    locator: &dyn Locate,
) -> Result<Vec<(Package, StaleScan)>, BuildError> {
    let packages = locator.locate(&project.source_roots())?;
    analyze(project, &packages)
}

// --- CORE: Build Project ---
pub fn build_project(project: &Project, env: &BuildEnv<'_>) -> Result<BuildSummary, BuildError> {
    let start_time = Instant::now();
    let build = &project.config.build;
    let sink = env.sink;

    if build.skip {
        sink.emit(Severity::Info, "Skipping compilation");
        return Ok(BuildSummary::default());
    }

    // 1. Discover packages
    let packages = env.locator.locate(&project.source_roots())?;
    tracing::debug!("{} package(s) found", packages.len());

    // 2. Provision the toolchain while analysing staleness
    let request: VersionRequest = project.config.toolchain.version.parse()?;
    let provisioner = env.provisioner;
    let platform = env.platform;
    let (toolchain, scans) = rayon::join(
        || provisioner.ensure(&request, &platform),
        || analyze(project, &packages),
    );
    let scans = scans?;
    let toolchain = toolchain?;
    tracing::debug!("compiler: {}", toolchain.executable.display());

    let up_to_date: usize = scans.iter().map(|(_, scan)| scan.fresh).sum();
    let stale: Vec<SourceUnit> = scans.into_iter().flat_map(|(_, scan)| scan.stale).collect();

    if stale.is_empty() {
        sink.emit(
            Severity::Info,
            &format!("Nothing to compile - {} unit(s) up to date", up_to_date),
        );
        return Ok(BuildSummary {
            up_to_date,
            elapsed: start_time.elapsed(),
            ..BuildSummary::default()
        });
    }

    // 3. Compile
    let timeout = (build.timeout_millis > 0).then(|| Duration::from_millis(build.timeout_millis));
    let mut scheduler = CompilationScheduler::new(Arc::clone(&env.runner), build.workers, timeout);
    if env.progress {
        scheduler = scheduler.with_progress(progress_bar(stale.len()));
    }
    let invocation = Invocation {
        args: build.args.clone(),
        checked: build.checked,
    };
    let report = scheduler.run(stale, &toolchain, &invocation)?;

    // 4. Replay in submission order
    let counts = LogAggregator::new(sink).replay(&report.outcomes);
    for unit in &report.not_completed {
        sink.emit(
            Severity::Warn,
            &format!("Not completed: {}", unit.display_path()),
        );
    }

    let summary = BuildSummary {
        compiled: counts.compiled,
        failed: counts.failed,
        not_completed: report.not_completed.len(),
        up_to_date,
        timed_out: report.timed_out,
        timeout_ms: build.timeout_millis,
        elapsed: start_time.elapsed(),
    };

    let severity = if summary.is_success() {
        Severity::Info
    } else {
        Severity::Error
    };
    sink.emit(severity, &summary.status_line());

    match summary.to_error() {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .progress_chars("#>-"),
    );
    pb.set_message("Compiling...");
    pb
}
