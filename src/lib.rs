//! # relay - incremental multi-package builds
//!
//! relay drives an external compiler over a tree of independent source
//! packages. It compiles only what changed, runs several compiler processes
//! at once under an optional deadline, and provisions the compiler itself
//! on first use.
//!
//! ## Module Organization
//!
//! - [`package`] - Package discovery (`package.toml` per package)
//! - [`build`] - Staleness analysis, compile scheduling, log replay
//! - [`toolchain`] - Toolchain download, cache, unpack and validation
//! - [`config`] - Project configuration (`relay.toml`)
//! - [`commands`] - CLI command handlers

/// Build pipeline.
pub mod build;

/// CLI command handlers extracted from main.
pub mod commands;

/// Configuration file parsing (`relay.toml`).
pub mod config;

/// Error types and process exit codes.
pub mod error;

/// Ant-style path patterns.
pub mod glob;

/// Log sinks and tracing setup.
pub mod logging;

/// Per-package manifest.
pub mod manifest;

/// Package discovery.
pub mod package;

/// Toolchain provisioning.
pub mod toolchain;

/// Terminal UI utilities (tables).
pub mod ui;

pub use error::BuildError;
