//! Local artifact cache for downloaded bundles.
//!
//! Layout: `<root>/toolchain/<classifier>/<revision>/<bundle>`.

use super::{Platform, ProvisionError};
use crate::config::Project;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    pub platform: Platform,
    pub revision: u64,
    pub bundle_name: String,
}

impl ArtifactId {
    pub fn new(platform: Platform, revision: u64, bundle_name: impl Into<String>) -> Self {
        Self {
            platform,
            revision,
            bundle_name: bundle_name.into(),
        }
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "toolchain:{}:{}", self.platform, self.revision)
    }
}

pub trait ArtifactCache: Send + Sync {
    /// Path of a previously registered artifact. Never touches the network.
    fn resolve(&self, id: &ArtifactId) -> Result<PathBuf, ProvisionError>;

    /// Store `file` under `id`, returning its cached location.
    fn register(&self, id: &ArtifactId, file: &Path) -> Result<PathBuf, ProvisionError>;
}

#[derive(Debug, Clone)]
pub struct LocalArtifactCache {
    root: PathBuf,
}

impl LocalArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.relay/cache`
    pub fn default_root() -> Result<PathBuf, ProvisionError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ProvisionError::Configuration("could not find home directory".to_string())
        })?;
        Ok(home.join(".relay").join("cache"))
    }

    /// `[toolchain] cache_dir`, or the home-directory default.
    pub fn from_project(project: &Project) -> Result<Self, ProvisionError> {
        let root = match &project.config.toolchain.cache_dir {
            Some(dir) => project.resolve(dir),
            None => Self::default_root()?,
        };
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &ArtifactId) -> PathBuf {
        self.root
            .join("toolchain")
            .join(id.platform.classifier())
            .join(id.revision.to_string())
            .join(&id.bundle_name)
    }

    /// Remove every cached artifact. Returns whether anything was removed.
    pub fn clean(&self) -> Result<bool, ProvisionError> {
        if !self.root.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.root).map_err(|e| ProvisionError::io(&self.root, e))?;
        Ok(true)
    }
}

impl ArtifactCache for LocalArtifactCache {
    fn resolve(&self, id: &ArtifactId) -> Result<PathBuf, ProvisionError> {
        let path = self.path_of(id);
        if path.exists() {
            Ok(path)
        } else {
            Err(ProvisionError::CacheMiss(id.to_string()))
        }
    }

    fn register(&self, id: &ArtifactId, file: &Path) -> Result<PathBuf, ProvisionError> {
        let target = self.path_of(id);
        if target == file {
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }
        // Prefer a move; fall back to copying across filesystems.
        if fs::rename(file, &target).is_err() {
            fs::copy(file, &target).map_err(|e| ProvisionError::io(&target, e))?;
            fs::remove_file(file).ok();
        }
        Ok(target)
    }
}
