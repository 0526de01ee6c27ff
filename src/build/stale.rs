//! Staleness analysis: which sources need recompiling.

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::glob::{GlobSet, to_slash};
use crate::package::Package;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// One source file and the output it compiles to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceUnit {
    pub source: PathBuf,
    pub package_root: PathBuf,
    /// Path of `source` relative to `package_root`.
    pub relative: PathBuf,
    pub output: PathBuf,
}

impl SourceUnit {
    /// `/`-separated relative path, used in log headers.
    pub fn display_path(&self) -> String {
        to_slash(&self.relative)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaleScan {
    /// Sorted by source path.
    pub stale: Vec<SourceUnit>,
    /// Matched units whose output is current.
    pub fresh: usize,
}

/// Output subdirectory for packages that live outside the project directory.
pub const EXTERNAL_DIR: &str = "external";

/// Places each package's outputs under the project output directory,
/// mirroring the package's location relative to the project.
///
/// Packages outside the project mirror their whole absolute path under
/// [`EXTERNAL_DIR`], so two external packages never share an output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    base_dir: PathBuf,
    output_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(base_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_root_for(&self, package: &Package) -> PathBuf {
        if let Ok(rel) = package.root.strip_prefix(&self.base_dir) {
            return self.output_dir.join(rel);
        }
        let mut out = self.output_dir.join(EXTERNAL_DIR);
        for component in package.root.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::Prefix(prefix) => {
                    let drive = prefix
                        .as_os_str()
                        .to_string_lossy()
                        .replace([':', '\\', '?'], "");
                    if !drive.is_empty() {
                        out.push(drive);
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Output roots for `packages`, in order. Two packages mapping to the
    /// same root is a configuration error.
    pub fn output_roots(&self, packages: &[Package]) -> Result<Vec<PathBuf>, BuildError> {
        let mut owners: BTreeMap<PathBuf, &Path> = BTreeMap::new();
        let mut roots = Vec::with_capacity(packages.len());
        for package in packages {
            let root = self.output_root_for(package);
            if let Some(other) = owners.insert(root.clone(), &package.root) {
                return Err(BuildError::config(format!(
                    "packages {} and {} would both write to {}",
                    other.display(),
                    package.root.display(),
                    root.display()
                )));
            }
            roots.push(root);
        }
        Ok(roots)
    }
}

#[derive(Debug, Clone)]
pub struct StalenessAnalyzer {
    include: GlobSet,
    exclude: GlobSet,
    source_ext: String,
    target_ext: String,
    grace_millis: u64,
    /// Subdirectories holding this file are packages of their own.
    manifest_name: String,
}

impl StalenessAnalyzer {
    pub fn new(
        include: &[String],
        exclude: &[String],
        source_ext: impl Into<String>,
        target_ext: impl Into<String>,
        grace_millis: u64,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            include: GlobSet::new(include)?,
            exclude: GlobSet::new(exclude)?,
            source_ext: source_ext.into(),
            target_ext: target_ext.into(),
            grace_millis,
            manifest_name: "package.toml".to_string(),
        })
    }

    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    pub fn from_config(build: &BuildConfig) -> Result<Self, BuildError> {
        Self::new(
            &build.effective_include(),
            &build.effective_exclude(),
            build.source_ext.clone(),
            build.target_ext.clone(),
            build.grace_millis,
        )
        .map(|analyzer| analyzer.with_manifest_name(build.manifest.clone()))
    }

    pub fn stale(&self, package: &Package, output_root: &Path) -> Result<Vec<SourceUnit>, BuildError> {
        Ok(self.scan(package, output_root)?.stale)
    }

    pub fn scan(&self, package: &Package, output_root: &Path) -> Result<StaleScan, BuildError> {
        let root = &package.root;
        if !root.is_dir() {
            return Err(BuildError::PackageVanished { root: root.clone() });
        }

        let mut scan = StaleScan::default();
        // Nested packages are scanned on their own.
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.path().join(&self.manifest_name).is_file()
            });
        for entry in walker {
            let entry = entry.map_err(|e| {
                if e.depth() == 0 {
                    BuildError::PackageVanished { root: root.clone() }
                } else {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    BuildError::io(path, std::io::Error::other(e.to_string()))
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = to_slash(relative);
            if !self.include.is_match(&rel) || self.exclude.is_match(&rel) {
                continue;
            }

            let unit = SourceUnit {
                source: entry.path().to_path_buf(),
                package_root: root.clone(),
                relative: relative.to_path_buf(),
                output: self.output_path(relative, output_root),
            };
            if self.is_stale(&unit)? {
                scan.stale.push(unit);
            } else {
                scan.fresh += 1;
            }
        }

        scan.stale.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(scan)
    }

    /// `relative` with the source extension swapped for the target one, under `output_root`.
    pub fn output_path(&self, relative: &Path, output_root: &Path) -> PathBuf {
        let mapped = match relative.extension() {
            Some(ext) if ext == self.source_ext.as_str() => relative.with_extension(&self.target_ext),
            _ => {
                let mut name = relative.as_os_str().to_os_string();
                name.push(".");
                name.push(&self.target_ext);
                PathBuf::from(name)
            }
        };
        output_root.join(mapped)
    }

    fn is_stale(&self, unit: &SourceUnit) -> Result<bool, BuildError> {
        let Some(out_ms) = mtime_millis(&unit.output) else {
            return Ok(true);
        };
        let src_ms = mtime_millis(&unit.source)
            .ok_or_else(|| BuildError::io(&unit.source, std::io::Error::other("unreadable mtime")))?;
        Ok(src_ms - self.grace_millis as i128 > out_ms)
    }
}

fn mtime_millis(path: &Path) -> Option<i128> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i128,
        Err(e) => -(e.duration().as_millis() as i128),
    };
    Some(millis)
}
