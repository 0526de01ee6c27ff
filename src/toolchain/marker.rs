//! Install marker: records which bundle is unpacked in the toolchain home.
//!
//! Written with a temp-file rename so a reader never sees a partial file.
//! Concurrent builds sharing one home race on it; the last writer wins.

use super::{Platform, ProvisionError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub revision: u64,
    pub date: String,
    pub classifier: String,
}

impl Marker {
    pub fn new(revision: u64, date: impl Into<String>, platform: &Platform) -> Self {
        Self {
            revision,
            date: date.into(),
            classifier: platform.classifier(),
        }
    }

    pub fn path(markers_dir: &Path, platform: &Platform) -> PathBuf {
        markers_dir.join(format!("toolchain-{}.json", platform.classifier()))
    }

    /// Read the marker for `platform`. A missing or unreadable marker is `None`.
    pub fn read(markers_dir: &Path, platform: &Platform) -> Option<Self> {
        let path = Self::path(markers_dir, platform);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Marker>(&content) {
            Ok(marker) if marker.classifier == platform.classifier() => Some(marker),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("ignoring corrupt marker {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn write(&self, markers_dir: &Path, platform: &Platform) -> Result<PathBuf, ProvisionError> {
        fs::create_dir_all(markers_dir).map_err(|e| ProvisionError::io(markers_dir, e))?;
        let path = Self::path(markers_dir, platform);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ProvisionError::io(&path, std::io::Error::other(e)))?;
        fs::write(&tmp, json).map_err(|e| ProvisionError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| ProvisionError::io(&path, e))?;
        Ok(path)
    }

    pub fn remove(markers_dir: &Path, platform: &Platform) -> Result<bool, ProvisionError> {
        let path = Self::path(markers_dir, platform);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| ProvisionError::io(&path, e))?;
        Ok(true)
    }
}
