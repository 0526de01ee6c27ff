//! Toolchain command handler
//!
//! Handles `relay toolchain` subcommands.

use anyhow::Result;
use colored::*;

use crate::config::Project;
use crate::toolchain::{Platform, Provision, ToolchainProvisioner, VersionRequest};

/// Toolchain subcommand operations
#[derive(Clone, Debug)]
pub enum ToolchainOp {
    /// Provision if needed and print the compiler path
    Ensure,
    /// Print the installed compiler path without touching the network
    Path,
    /// Remove the marker and unpacked toolchain
    Clear,
}

pub fn handle_toolchain(project: &Project, op: ToolchainOp) -> Result<()> {
    let platform = Platform::current();
    let provisioner = ToolchainProvisioner::from_project(project)?;

    match op {
        ToolchainOp::Ensure => {
            let request: VersionRequest = project.config.toolchain.version.parse()?;
            let handle = provisioner.ensure(&request, &platform)?;
            match handle.revision {
                Some(rev) => println!(
                    "{} Toolchain {} ({})",
                    "✓".green(),
                    rev,
                    handle.classifier
                ),
                None => println!("{} Using configured toolchain", "✓".green()),
            }
            println!("{}", handle.executable.display());
        }
        ToolchainOp::Path => match provisioner.installed(&platform) {
            Some(handle) => println!("{}", handle.executable.display()),
            None => {
                println!(
                    "{} No toolchain installed for {}. Run `relay toolchain ensure`.",
                    "!".yellow(),
                    platform
                );
            }
        },
        ToolchainOp::Clear => {
            if provisioner.clear(&platform)? {
                println!("{} Toolchain for {} removed.", "✓".green(), platform);
            } else {
                println!("{} No toolchain installed for {}.", "ℹ".blue(), platform);
            }
        }
    }
    Ok(())
}
