//! Project configuration (`relay.toml`).
//!
//! Every field has a default so an empty file is a valid configuration.
//! Relative paths are resolved against the directory containing the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "relay.toml";

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub build: BuildConfig,
    pub toolchain: ToolchainConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BuildConfig {
    pub source_roots: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// File name that marks a directory as a package.
    pub manifest: String,
    pub source_ext: String,
    pub target_ext: String,
    /// Directory holding fetched dependencies inside a package; never compiled.
    pub generated_dir: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Modification-time slack when comparing a source to its output.
    pub grace_millis: u64,
    /// Parallel compiler invocations; `0` uses every logical CPU.
    pub workers: usize,
    /// Aggregate deadline for all invocations; `0` waits indefinitely.
    pub timeout_millis: u64,
    /// Pass `-c` (checked mode) to the compiler.
    pub checked: bool,
    /// Extra arguments placed before the per-unit output and source arguments.
    pub args: Vec<String>,
    pub skip: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_roots: vec![PathBuf::from("src")],
            output_dir: PathBuf::from("build").join("out"),
            manifest: "package.toml".to_string(),
            source_ext: "src".to_string(),
            target_ext: "out".to_string(),
            generated_dir: "packages".to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
            grace_millis: 0,
            workers: 0,
            timeout_millis: 0,
            checked: false,
            args: Vec::new(),
            skip: false,
        }
    }
}

impl BuildConfig {
    /// Include patterns, falling back to every file with the source extension.
    pub fn effective_include(&self) -> Vec<String> {
        if self.include.is_empty() {
            vec![format!("**/*.{}", self.source_ext)]
        } else {
            self.include.clone()
        }
    }

    /// Exclude patterns, falling back to the generated-dependencies directory.
    pub fn effective_exclude(&self) -> Vec<String> {
        if self.exclude.is_empty() {
            vec![format!("**/{}/**", self.generated_dir)]
        } else {
            self.exclude.clone()
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ToolchainConfig {
    /// `"latest"` or a numeric revision.
    pub version: String,
    pub server_url: Option<String>,
    /// Pre-installed compiler; when present, nothing is downloaded.
    pub executable: Option<PathBuf>,
    /// Where bundles are unpacked.
    pub home: PathBuf,
    pub markers_dir: PathBuf,
    /// Local artifact cache; defaults to `~/.relay/cache`.
    pub cache_dir: Option<PathBuf>,
    /// Compiler path inside the unpacked bundle.
    pub binary: PathBuf,
    pub bundle_prefix: String,
    pub offline: bool,
    /// Reuse an existing `latest` install without asking the server for a newer one.
    pub skip_update_check: bool,
    pub download_retries: u32,
    pub http_timeout_secs: u64,
    pub sha256: Option<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            version: "latest".to_string(),
            server_url: None,
            executable: None,
            home: PathBuf::from(".relay").join("toolchain"),
            markers_dir: PathBuf::from(".relay").join("markers"),
            cache_dir: None,
            binary: PathBuf::from("sdk").join("bin").join("compile"),
            bundle_prefix: "sdk".to_string(),
            offline: false,
            skip_update_check: false,
            download_retries: 1,
            http_timeout_secs: 60,
            sha256: None,
        }
    }
}

/// Command-line values that take precedence over `relay.toml`.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workers: Option<usize>,
    pub timeout_millis: Option<u64>,
    pub grace_millis: Option<u64>,
    pub checked: bool,
    pub version: Option<String>,
    pub executable: Option<PathBuf>,
    pub offline: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(workers) = self.workers {
            config.build.workers = workers;
        }
        if let Some(timeout) = self.timeout_millis {
            config.build.timeout_millis = timeout;
        }
        if let Some(grace) = self.grace_millis {
            config.build.grace_millis = grace;
        }
        if self.checked {
            config.build.checked = true;
        }
        if let Some(version) = &self.version {
            config.toolchain.version = version.clone();
        }
        if let Some(exe) = &self.executable {
            config.toolchain.executable = Some(exe.clone());
        }
        if self.offline {
            config.toolchain.offline = true;
        }
    }
}

/// A parsed configuration plus the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct Project {
    pub base_dir: PathBuf,
    pub config: RelayConfig,
}

impl Project {
    pub fn new(base_dir: impl Into<PathBuf>, config: RelayConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            config,
        }
    }

    /// Resolve `path` against the project directory unless already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn source_roots(&self) -> Vec<PathBuf> {
        self.config
            .build
            .source_roots
            .iter()
            .map(|root| self.resolve(root))
            .collect()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.config.build.output_dir)
    }
}

pub fn parse_config(content: &str) -> Result<RelayConfig> {
    toml::from_str(content).context("Failed to parse relay.toml - check for syntax errors")
}

// --- Helper: Load Config ---
pub fn load_config(path: &Path) -> Result<Project> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "{} not found.\n\n\
            💡 Tip: create one at the project root; an empty file uses the defaults.",
            path.display()
        ));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} - check file permissions", path.display()))?;
    let config = parse_config(&content)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    let base_dir = fs::canonicalize(parent)
        .with_context(|| format!("Failed to resolve project directory {}", parent.display()))?;

    Ok(Project::new(base_dir, config))
}
