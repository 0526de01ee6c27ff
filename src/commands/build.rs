//! `relay build`, `relay stale` and `relay packages`.

use anyhow::Result;
use colored::*;
use std::sync::Arc;

use crate::build::{self, BuildEnv, SystemRunner};
use crate::config::Project;
use crate::logging::ConsoleSink;
use crate::package::{Locate, PackageLocator, packages_by_name};
use crate::toolchain::{Platform, ToolchainProvisioner};
use crate::ui;

pub fn locator_for(project: &Project) -> PackageLocator {
    PackageLocator::new(
        project.config.build.manifest.clone(),
        project.config.build.generated_dir.clone(),
    )
}

pub fn handle_build(project: &Project) -> Result<()> {
    let platform = Platform::current();
    let locator = locator_for(project);
    let provisioner = ToolchainProvisioner::from_project(project)?;
    let sink = ConsoleSink;

    println!("{} Building {}", "🔨".cyan(), project.base_dir.display());
    let env = BuildEnv {
        platform,
        locator: &locator,
        provisioner: &provisioner,
        runner: Arc::new(SystemRunner),
        sink: &sink,
        progress: console::Term::stdout().is_term(),
    };
    build::build_project(project, &env)?;
    Ok(())
}

pub fn handle_stale(project: &Project) -> Result<()> {
    let scans = build::stale_units(project, &locator_for(project))?;
    let mut table = ui::Table::new(&["Package", "Unit", "Output"]);
    let mut fresh = 0;
    for (package, scan) in &scans {
        fresh += scan.fresh;
        for unit in &scan.stale {
            table.add_row(vec![
                package.display_name(),
                unit.display_path(),
                unit.output.display().to_string(),
            ]);
        }
    }

    if table.is_empty() {
        println!("{} Nothing to compile - {} unit(s) up to date", "✓".green(), fresh);
    } else {
        table.print();
        println!("   {} unit(s) up to date", fresh);
    }
    Ok(())
}

pub fn handle_packages(project: &Project) -> Result<()> {
    let packages = locator_for(project).locate(&project.source_roots())?;
    packages_by_name(&packages)?;

    if packages.is_empty() {
        println!("{} No packages found.", "!".yellow());
        return Ok(());
    }
    let mut table = ui::Table::new(&["Name", "Root", "Dependencies"]);
    for package in &packages {
        table.add_row(vec![
            package.display_name().bold().to_string(),
            package.root.display().to_string(),
            package.dependencies.join(", "),
        ]);
    }
    table.print();
    Ok(())
}
