//! Error taxonomy for a build invocation.
//!
//! Every fatal condition maps to one [`BuildError`] variant, and every variant
//! maps to a distinct process exit code so scripts can tell a broken
//! configuration from a failed download, a failed compile or a timeout.

use crate::toolchain::ProvisionError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a build where every unit compiled.
pub const EXIT_SUCCESS: i32 = 0;
/// One or more units failed to compile.
pub const EXIT_COMPILATION_FAILED: i32 = 1;
/// Invalid project layout, config file, or toolchain location.
pub const EXIT_CONFIGURATION: i32 = 2;
/// The toolchain could not be resolved, downloaded, or unpacked.
pub const EXIT_PROVISIONING: i32 = 3;
/// The aggregate compile deadline elapsed before all units finished.
pub const EXIT_TIMEOUT: i32 = 4;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("package root '{}' disappeared before it could be scanned", root.display())]
    PackageVanished { root: PathBuf },

    #[error(transparent)]
    Provisioning(#[from] ProvisionError),

    #[error("{failed} of {total} unit(s) failed to compile")]
    CompilationFailed { failed: usize, total: usize },

    #[error(
        "compilation timed out after {timeout_ms} ms: {completed} unit(s) finished, {pending} not completed"
    )]
    Timeout {
        timeout_ms: u64,
        completed: usize,
        pending: usize,
    },

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn config(msg: impl Into<String>) -> Self {
        BuildError::Configuration(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code reported by the `relay` binary for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Configuration(_) | BuildError::PackageVanished { .. } => {
                EXIT_CONFIGURATION
            }
            BuildError::Provisioning(e) if e.is_configuration() => EXIT_CONFIGURATION,
            BuildError::Provisioning(_) => EXIT_PROVISIONING,
            BuildError::CompilationFailed { .. } => EXIT_COMPILATION_FAILED,
            BuildError::Timeout { .. } => EXIT_TIMEOUT,
            BuildError::Io { .. } => EXIT_CONFIGURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            BuildError::config("x").exit_code(),
            BuildError::Provisioning(ProvisionError::CacheMiss("id".into())).exit_code(),
            BuildError::CompilationFailed {
                failed: 1,
                total: 2,
            }
            .exit_code(),
            BuildError::Timeout {
                timeout_ms: 10,
                completed: 0,
                pending: 1,
            }
            .exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
        assert!(!codes.contains(&EXIT_SUCCESS));
    }

    #[test]
    fn test_packaging_not_ready_is_configuration_class() {
        let err = BuildError::from(ProvisionError::Configuration(
            "bundle is a directory".into(),
        ));
        assert_eq!(err.exit_code(), EXIT_CONFIGURATION);
    }

    #[test]
    fn test_timeout_message_mentions_not_completed() {
        let err = BuildError::Timeout {
            timeout_ms: 500,
            completed: 2,
            pending: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("500 ms"));
        assert!(msg.contains("3 not completed"));
    }
}
