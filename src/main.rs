//! # relay CLI Entry Point
//!
//! Parses arguments with clap, loads `relay.toml`, and routes to the
//! handlers in [`relay::commands`]. Errors are printed once here and mapped
//! to the exit codes documented in [`relay::error`].

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::path::PathBuf;

use relay::commands::{self, cache::CacheOp, toolchain::ToolchainOp};
use relay::config::{self, CONFIG_FILE, ConfigOverrides, Project};
use relay::error::EXIT_SUCCESS;
use relay::logging;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Incremental multi-package builds through an external compiler", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"), disable_version_flag = true)]
struct Cli {
    /// Show diagnostic output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the project configuration
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Parallel compiler invocations (0 = all CPUs)
    #[arg(long, global = true)]
    workers: Option<usize>,
    /// Aggregate compile deadline in milliseconds (0 = none)
    #[arg(long = "timeout-ms", global = true)]
    timeout_ms: Option<u64>,
    /// Modification-time slack in milliseconds
    #[arg(long = "grace-ms", global = true)]
    grace_ms: Option<u64>,
    /// Compile in checked mode
    #[arg(long, global = true)]
    checked: bool,
    /// Toolchain version: "latest" or a revision number
    #[arg(long, global = true, value_name = "VERSION")]
    version: Option<String>,
    /// Use this compiler instead of provisioning one
    #[arg(long, global = true, value_name = "PATH")]
    executable: Option<PathBuf>,
    /// Never download
    #[arg(long, global = true)]
    offline: bool,
}

impl From<&OverrideArgs> for ConfigOverrides {
    fn from(args: &OverrideArgs) -> Self {
        ConfigOverrides {
            workers: args.workers,
            timeout_millis: args.timeout_ms,
            grace_millis: args.grace_ms,
            checked: args.checked,
            version: args.version.clone(),
            executable: args.executable.clone(),
            offline: args.offline,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every stale unit
    Build,
    /// List stale units without compiling
    Stale,
    /// List discovered packages
    Packages,
    /// Manage the compiler toolchain
    Toolchain {
        #[command(subcommand)]
        op: ToolchainCommands,
    },
    /// Manage the local artifact cache
    Cache {
        #[command(subcommand)]
        op: CacheCommands,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ToolchainCommands {
    /// Provision the toolchain if needed and print the compiler path
    Ensure,
    /// Print the installed compiler path
    Path,
    /// Remove the installed toolchain
    Clear,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print cache directory location
    Path,
    /// Remove every cached bundle
    Clean,
}

fn load_project(cli: &Cli) -> Result<Project> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut project = config::load_config(&path)?;
    ConfigOverrides::from(&cli.overrides).apply(&mut project.config);
    Ok(project)
}

fn run(cli: &Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let project = load_project(cli)?;
    match &cli.command {
        Commands::Build => commands::build::handle_build(&project),
        Commands::Stale => commands::build::handle_stale(&project),
        Commands::Packages => commands::build::handle_packages(&project),
        Commands::Toolchain { op } => {
            let op = match op {
                ToolchainCommands::Ensure => ToolchainOp::Ensure,
                ToolchainCommands::Path => ToolchainOp::Path,
                ToolchainCommands::Clear => ToolchainOp::Clear,
            };
            commands::toolchain::handle_toolchain(&project, op)
        }
        Commands::Cache { op } => {
            let op = match op {
                CacheCommands::Path => CacheOp::Path,
                CacheCommands::Clean => CacheOp::Clean,
            };
            commands::cache::handle_cache(&project, op)
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let code = match run(&cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "x".red(), e);
            commands::exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
