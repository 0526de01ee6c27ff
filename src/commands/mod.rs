//! CLI command handlers
//!
//! Each handler takes an already-loaded [`Project`](crate::config::Project)
//! and returns `anyhow::Result`; typed library errors stay downcastable so
//! the binary can map them to exit codes.

pub mod build;
pub mod cache;
pub mod toolchain;

use crate::error::{BuildError, EXIT_CONFIGURATION, EXIT_PROVISIONING};
use crate::toolchain::ProvisionError;

/// Process exit code for an error surfaced by a handler.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<BuildError>() {
        return e.exit_code();
    }
    if let Some(e) = err.downcast_ref::<ProvisionError>() {
        return if e.is_configuration() {
            EXIT_CONFIGURATION
        } else {
            EXIT_PROVISIONING
        };
    }
    EXIT_CONFIGURATION
}
