//! Marker, cache, download, extract and validate, in that order.

use super::{
    ArtifactCache, ArtifactId, Extractor, HttpEndpoint, LocalArtifactCache, Marker, NoServer,
    Platform, Provision, ProvisionError, RemoteEndpoint, ToolchainHandle, VersionInfo,
    VersionRequest, ZipExtractor, executable_name, is_executable,
};
use crate::config::Project;
use colored::*;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MAX_DOWNLOAD_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Bundles are unpacked to `<home>/<classifier>`.
    pub home: PathBuf,
    pub markers_dir: PathBuf,
    /// Compiler path relative to the unpacked bundle root.
    pub binary: PathBuf,
    pub bundle_prefix: String,
    /// Use this compiler as-is instead of provisioning one.
    pub executable: Option<PathBuf>,
    pub offline: bool,
    pub skip_update_check: bool,
    pub download_retries: u32,
    /// Expected lowercase hex digest of freshly downloaded bundles.
    pub sha256: Option<String>,
}

impl ProvisionSettings {
    pub fn new(home: impl Into<PathBuf>, markers_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            markers_dir: markers_dir.into(),
            binary: PathBuf::from("sdk").join("bin").join("compile"),
            bundle_prefix: "sdk".to_string(),
            executable: None,
            offline: false,
            skip_update_check: false,
            download_retries: 1,
            sha256: None,
        }
    }

    pub fn from_project(project: &Project) -> Self {
        let tc = &project.config.toolchain;
        Self {
            home: project.resolve(&tc.home),
            markers_dir: project.resolve(&tc.markers_dir),
            binary: tc.binary.clone(),
            bundle_prefix: tc.bundle_prefix.clone(),
            executable: tc.executable.as_ref().map(|p| project.resolve(p)),
            offline: tc.offline,
            skip_update_check: tc.skip_update_check,
            download_retries: tc.download_retries,
            sha256: tc.sha256.clone(),
        }
    }

    pub fn toolchain_dir(&self, platform: &Platform) -> PathBuf {
        self.home.join(platform.classifier())
    }

    pub fn executable_path(&self, platform: &Platform) -> PathBuf {
        executable_name(&self.toolchain_dir(platform).join(&self.binary), platform)
    }

    pub fn bundle_name(&self, platform: &Platform) -> String {
        format!("{}-{}.zip", self.bundle_prefix, platform.classifier())
    }

    fn staging_dir(&self) -> PathBuf {
        self.home.join(".download")
    }
}

pub struct ToolchainProvisioner {
    settings: ProvisionSettings,
    remote: Arc<dyn RemoteEndpoint>,
    cache: Arc<dyn ArtifactCache>,
    extractor: Arc<dyn Extractor>,
}

impl ToolchainProvisioner {
    pub fn new(
        settings: ProvisionSettings,
        remote: Arc<dyn RemoteEndpoint>,
        cache: Arc<dyn ArtifactCache>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            settings,
            remote,
            cache,
            extractor,
        }
    }

    /// Wire up the HTTP endpoint, home-directory cache and zip extractor
    /// from a project's `[toolchain]` section.
    pub fn from_project(project: &Project) -> Result<Self, ProvisionError> {
        let tc = &project.config.toolchain;
        let remote: Arc<dyn RemoteEndpoint> = match &tc.server_url {
            Some(url) => Arc::new(HttpEndpoint::new(
                url.clone(),
                Duration::from_secs(tc.http_timeout_secs.max(1)),
            )),
            None => Arc::new(NoServer),
        };
        Ok(Self::new(
            ProvisionSettings::from_project(project),
            remote,
            Arc::new(LocalArtifactCache::from_project(project)?),
            Arc::new(ZipExtractor),
        ))
    }

    /// The currently installed toolchain, if any, without touching the network.
    pub fn installed(&self, platform: &Platform) -> Option<ToolchainHandle> {
        if let Some(exe) = &self.settings.executable {
            return is_executable(exe).then(|| ToolchainHandle {
                revision: None,
                classifier: *platform,
                executable: exe.clone(),
            });
        }
        let marker = Marker::read(&self.settings.markers_dir, platform)?;
        let executable = self.settings.executable_path(platform);
        is_executable(&executable).then(|| ToolchainHandle {
            revision: Some(marker.revision),
            classifier: *platform,
            executable,
        })
    }

    /// Forget the installed toolchain: remove its marker and unpacked tree.
    pub fn clear(&self, platform: &Platform) -> Result<bool, ProvisionError> {
        let had_marker = Marker::remove(&self.settings.markers_dir, platform)?;
        let dir = self.settings.toolchain_dir(platform);
        let had_tree = dir.exists();
        if had_tree {
            fs::remove_dir_all(&dir).map_err(|e| ProvisionError::io(&dir, e))?;
        }
        Ok(had_marker || had_tree)
    }

    fn handle(&self, revision: u64, platform: &Platform) -> ToolchainHandle {
        ToolchainHandle {
            revision: Some(revision),
            classifier: *platform,
            executable: self.settings.executable_path(platform),
        }
    }

    fn fetch_latest(&self) -> Result<VersionInfo, ProvisionError> {
        if self.settings.offline {
            return Err(ProvisionError::Offline("latest/VERSION".to_string()));
        }
        self.remote.latest_version()
    }

    fn download(&self, id: &ArtifactId) -> Result<PathBuf, ProvisionError> {
        if self.settings.offline {
            return Err(ProvisionError::Offline(id.to_string()));
        }
        let attempts = self.settings.download_retries.clamp(1, MAX_DOWNLOAD_ATTEMPTS);
        let staging = self.settings.staging_dir();

        println!(
            "{} Downloading toolchain {} ({})...",
            "⬇".blue(),
            id.revision,
            id.bundle_name
        );
        let mut attempt = 1;
        loop {
            match self
                .remote
                .download_bundle(id.revision, &id.bundle_name, &staging)
            {
                Ok(path) => {
                    self.verify_checksum(&path)?;
                    return Ok(path);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!("download attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn verify_checksum(&self, path: &Path) -> Result<(), ProvisionError> {
        let Some(expected) = &self.settings.sha256 else {
            return Ok(());
        };
        let expected = expected.trim().to_ascii_lowercase();
        let actual = sha256_file(path)?;
        if actual == expected {
            return Ok(());
        }
        fs::remove_file(path).ok();
        Err(ProvisionError::Checksum {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }

    fn install(
        &self,
        archive: &Path,
        revision: u64,
        date: &str,
        platform: &Platform,
    ) -> Result<ToolchainHandle, ProvisionError> {
        if archive.is_dir() {
            return Err(ProvisionError::Configuration(format!(
                "toolchain bundle {} is a directory; the artifact has not been packaged yet",
                archive.display()
            )));
        }

        Marker::remove(&self.settings.markers_dir, platform)?;
        let dir = self.settings.toolchain_dir(platform);
        if dir.exists() {
            tracing::debug!("removing previous toolchain at {}", dir.display());
            fs::remove_dir_all(&dir).map_err(|e| ProvisionError::io(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| ProvisionError::io(&dir, e))?;

        println!("{} Extracting toolchain...", "📦".blue());
        self.extractor.extract(archive, &dir)?;

        let executable = self.settings.executable_path(platform);
        if !is_executable(&executable) {
            return Err(ProvisionError::Configuration(format!(
                "toolchain executable {} is missing or not executable",
                executable.display()
            )));
        }

        Marker::new(revision, date, platform).write(&self.settings.markers_dir, platform)?;
        println!("{} Toolchain {} ready", "✓".green(), revision);
        Ok(self.handle(revision, platform))
    }
}

impl Provision for ToolchainProvisioner {
    fn ensure(
        &self,
        request: &VersionRequest,
        platform: &Platform,
    ) -> Result<ToolchainHandle, ProvisionError> {
        if let Some(exe) = &self.settings.executable {
            if is_executable(exe) {
                tracing::debug!("using configured toolchain {}", exe.display());
                return Ok(ToolchainHandle {
                    revision: None,
                    classifier: *platform,
                    executable: exe.clone(),
                });
            }
            return Err(ProvisionError::Configuration(format!(
                "configured toolchain executable {} does not exist or is not executable",
                exe.display()
            )));
        }

        let mut latest: Option<VersionInfo> = None;
        if let Some(marker) = Marker::read(&self.settings.markers_dir, platform)
            && is_executable(&self.settings.executable_path(platform))
        {
            match request {
                VersionRequest::Revision(r) if marker.revision == *r => {
                    tracing::debug!("toolchain {} already installed", r);
                    return Ok(self.handle(marker.revision, platform));
                }
                VersionRequest::Revision(r) => {
                    tracing::debug!("installed toolchain {} != requested {}", marker.revision, r);
                }
                VersionRequest::Latest
                    if self.settings.skip_update_check || self.settings.offline =>
                {
                    return Ok(self.handle(marker.revision, platform));
                }
                VersionRequest::Latest => {
                    let info = self.fetch_latest()?;
                    if !info.is_newer_than(marker.revision, &marker.date) {
                        tracing::debug!("toolchain {} is current", marker.revision);
                        return Ok(self.handle(marker.revision, platform));
                    }
                    tracing::debug!("newer toolchain {} available", info.revision);
                    latest = Some(info);
                }
            }
        }

        let (revision, date) = match request {
            VersionRequest::Revision(r) => (*r, String::new()),
            VersionRequest::Latest => {
                let info = match latest {
                    Some(info) => info,
                    None => self.fetch_latest()?,
                };
                (info.revision, info.date)
            }
        };

        let id = ArtifactId::new(*platform, revision, self.settings.bundle_name(platform));
        let archive = match self.cache.resolve(&id) {
            Ok(path) => {
                tracing::debug!("cache hit for {}", id);
                path
            }
            Err(ProvisionError::CacheMiss(_)) => {
                let downloaded = self.download(&id)?;
                self.cache.register(&id, &downloaded)?
            }
            Err(e) => return Err(e),
        };

        self.install(&archive, revision, &date, platform)
    }
}

fn sha256_file(path: &Path) -> Result<String, ProvisionError> {
    let mut file = File::open(path).map_err(|e| ProvisionError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| ProvisionError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}
