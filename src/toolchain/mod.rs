//! Toolchain provisioning.
//!
//! The external compiler is fetched as a zip bundle, unpacked under the
//! toolchain home, and recorded in a marker file so later builds skip the
//! network entirely. The pieces are split so each can be replaced in tests:
//!
//! - [`RemoteEndpoint`] talks to the download server
//! - [`ArtifactCache`] keeps downloaded bundles on local disk
//! - [`Extractor`] unpacks a bundle
//! - [`ToolchainProvisioner`] strings them together

pub mod cache;
pub mod extract;
pub mod marker;
pub mod platform;
pub mod provision;
pub mod remote;
pub mod version;

pub use cache::{ArtifactCache, ArtifactId, LocalArtifactCache};
pub use extract::{Extractor, ZipExtractor};
pub use marker::Marker;
pub use platform::{OsFamily, Platform};
pub use provision::{ProvisionSettings, ToolchainProvisioner};
pub use remote::{HttpEndpoint, NoServer, RemoteEndpoint};
pub use version::{VersionInfo, VersionRequest};

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A validated, ready-to-run toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainHandle {
    /// `None` for a user-supplied executable of unknown revision.
    pub revision: Option<u64>,
    pub classifier: Platform,
    pub executable: PathBuf,
}

pub trait Provision: Send + Sync {
    fn ensure(
        &self,
        request: &VersionRequest,
        platform: &Platform,
    ) -> Result<ToolchainHandle, ProvisionError>;
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("toolchain configuration error: {0}")]
    Configuration(String),

    #[error("transfer from {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("artifact {0} is not in the local cache")]
    CacheMiss(String),

    #[error("artifact {0} must be downloaded but offline mode is enabled")]
    Offline(String),

    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("invalid version document: {0}")]
    VersionDocument(String),

    #[error("failed to unpack {}: {message}", archive.display())]
    Extract { archive: PathBuf, message: String },

    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors caused by the local setup rather than the server.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProvisionError::Configuration(_))
    }

    /// Whether another download attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::Transfer { .. } => true,
            ProvisionError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// `path`, or `path.bat` on Windows.
pub(crate) fn executable_name(path: &Path, platform: &Platform) -> PathBuf {
    if platform.os() == OsFamily::Windows {
        let mut name = path.as_os_str().to_os_string();
        name.push(".bat");
        PathBuf::from(name)
    } else {
        path.to_path_buf()
    }
}

/// Whether `path` is a file the current user may run.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transfer_class_errors_retry() {
        let transfer = ProvisionError::Transfer {
            url: "u".into(),
            message: "reset".into(),
        };
        let server = ProvisionError::Status {
            url: "u".into(),
            status: 503,
        };
        let missing = ProvisionError::Status {
            url: "u".into(),
            status: 404,
        };
        assert!(transfer.is_retryable());
        assert!(server.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!ProvisionError::Configuration("dir".into()).is_retryable());
        assert!(
            !ProvisionError::Checksum {
                path: "a".into(),
                expected: "1".into(),
                actual: "2".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_windows_executable_gets_bat_suffix() {
        let win = Platform::classify("windows", "x86_64");
        let linux = Platform::classify("linux", "x86_64");
        let exe = Path::new("sdk/bin/compile");
        assert_eq!(executable_name(exe, &win), PathBuf::from("sdk/bin/compile.bat"));
        assert_eq!(executable_name(exe, &linux), exe);
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable_checks_mode_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tool");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&file));
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&file));
        assert!(!is_executable(dir.path()));
    }
}
