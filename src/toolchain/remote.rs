//! Download server access.

use super::{ProvisionError, VersionInfo};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub trait RemoteEndpoint: Send + Sync {
    /// Fetch and parse `latest/VERSION`.
    fn latest_version(&self) -> Result<VersionInfo, ProvisionError>;

    /// Download `bundle_name` of `revision` into the directory `dest`,
    /// returning the path of the downloaded file.
    fn download_bundle(
        &self,
        revision: u64,
        bundle_name: &str,
        dest: &Path,
    ) -> Result<PathBuf, ProvisionError>;
}

/// Server layout: `{base}/latest/VERSION` and `{base}/{revision}/{bundle}`.
pub struct HttpEndpoint {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpEndpoint {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn version_url(&self) -> String {
        format!("{}/latest/VERSION", self.base_url)
    }

    pub fn bundle_url(&self, revision: u64, bundle_name: &str) -> String {
        format!("{}/{}/{}", self.base_url, revision, bundle_name)
    }

    fn get(&self, url: &str) -> Result<ureq::http::Response<ureq::Body>, ProvisionError> {
        tracing::debug!("GET {}", url);
        self.agent.get(url).call().map_err(|e| classify(url, e))
    }
}

impl RemoteEndpoint for HttpEndpoint {
    fn latest_version(&self) -> Result<VersionInfo, ProvisionError> {
        let url = self.version_url();
        let mut response = self.get(&url)?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| classify(&url, e))?;
        VersionInfo::parse(&body)
    }

    fn download_bundle(
        &self,
        revision: u64,
        bundle_name: &str,
        dest: &Path,
    ) -> Result<PathBuf, ProvisionError> {
        let url = self.bundle_url(revision, bundle_name);
        let response = self.get(&url)?;

        let total_size = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        fs::create_dir_all(dest).map_err(|e| ProvisionError::io(dest, e))?;
        let target = dest.join(bundle_name);
        let partial = dest.join(format!("{}.part", bundle_name));

        let pb = progress_bar(total_size);
        let mut file = File::create(&partial).map_err(|e| ProvisionError::io(&partial, e))?;
        let mut reader = response.into_body().into_reader();
        let mut buffer = [0; 8192];

        loop {
            let n = reader.read(&mut buffer).map_err(|e| ProvisionError::Transfer {
                url: url.clone(),
                message: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| ProvisionError::io(&partial, e))?;
            pb.inc(n as u64);
        }
        drop(file);
        pb.finish_and_clear();

        fs::rename(&partial, &target).map_err(|e| ProvisionError::io(&target, e))?;
        Ok(target)
    }
}

/// Stands in when no `server_url` is configured; any use is a configuration error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoServer;

impl NoServer {
    fn error() -> ProvisionError {
        ProvisionError::Configuration(
            "the toolchain must be downloaded but [toolchain] server_url is not set".to_string(),
        )
    }
}

impl RemoteEndpoint for NoServer {
    fn latest_version(&self) -> Result<VersionInfo, ProvisionError> {
        Err(Self::error())
    }

    fn download_bundle(&self, _: u64, _: &str, _: &Path) -> Result<PathBuf, ProvisionError> {
        Err(Self::error())
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.blue} [{elapsed_precise}] [{bar:40.green/black}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("◐◓◑◒")
        .progress_chars("━━╸"));
    pb
}

fn classify(url: &str, err: ureq::Error) -> ProvisionError {
    match err {
        ureq::Error::StatusCode(status) => ProvisionError::Status {
            url: url.to_string(),
            status,
        },
        other => ProvisionError::Transfer {
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}
