//! Package discovery.
//!
//! A package is any directory holding a manifest file. Source roots are
//! searched recursively; hidden directories and the generated-dependencies
//! directory are never entered.

use crate::error::BuildError;
use crate::manifest::Manifest;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An independently buildable source package, identified by its canonical root.
#[derive(Debug, Clone)]
pub struct Package {
    pub root: PathBuf,
    pub name: Option<String>,
    pub dependencies: Vec<String>,
    /// The configured source root this package was found under.
    pub source_root: PathBuf,
}

impl Package {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source_root: root.clone(),
            root,
            name: None,
            dependencies: Vec::new(),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.root.display().to_string()),
        }
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.root.cmp(&other.root)
    }
}

pub trait Locate: Send + Sync {
    fn locate(&self, roots: &[PathBuf]) -> Result<Vec<Package>, BuildError>;
}

#[derive(Debug, Clone)]
pub struct PackageLocator {
    manifest_name: String,
    generated_dir: String,
}

impl PackageLocator {
    pub fn new(manifest_name: impl Into<String>, generated_dir: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
            generated_dir: generated_dir.into(),
        }
    }

    fn check_root(root: &Path) -> Result<PathBuf, BuildError> {
        let meta = fs::metadata(root).map_err(|_| {
            BuildError::config(format!("source root '{}' does not exist", root.display()))
        })?;
        if !meta.is_dir() {
            return Err(BuildError::config(format!(
                "source root '{}' is not a directory",
                root.display()
            )));
        }
        if fs::read_dir(root).is_err() {
            return Err(BuildError::config(format!(
                "source root '{}' is not readable",
                root.display()
            )));
        }
        if meta.permissions().readonly() {
            return Err(BuildError::config(format!(
                "source root '{}' is not writable",
                root.display()
            )));
        }
        fs::canonicalize(root).map_err(|e| BuildError::io(root, e))
    }

    fn descend(&self, name: &str) -> bool {
        !name.starts_with('.') && name != self.generated_dir
    }
}

impl Default for PackageLocator {
    fn default() -> Self {
        Self::new("package.toml", "packages")
    }
}

impl Locate for PackageLocator {
    fn locate(&self, roots: &[PathBuf]) -> Result<Vec<Package>, BuildError> {
        let mut found: BTreeMap<PathBuf, Package> = BTreeMap::new();

        for configured in roots {
            let source_root = Self::check_root(configured)?;

            let walker = WalkDir::new(&source_root).into_iter().filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || self.descend(&e.file_name().to_string_lossy())
            });

            for entry in walker {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(&source_root).to_path_buf();
                    BuildError::io(path, std::io::Error::other(e.to_string()))
                })?;
                if !entry.file_type().is_file() || entry.file_name() != self.manifest_name.as_str()
                {
                    continue;
                }
                let Some(dir) = entry.path().parent() else {
                    continue;
                };
                let root = fs::canonicalize(dir).map_err(|e| BuildError::io(dir, e))?;
                if found.contains_key(&root) {
                    continue;
                }

                let manifest = Manifest::load(entry.path())?;
                tracing::debug!("found package at {}", root.display());
                found.insert(
                    root.clone(),
                    Package {
                        root,
                        name: manifest.name,
                        dependencies: manifest.dependencies,
                        source_root: source_root.clone(),
                    },
                );
            }
        }

        Ok(found.into_values().collect())
    }
}

/// Index named packages. Two packages sharing a name is an error.
pub fn packages_by_name(packages: &[Package]) -> Result<BTreeMap<String, Package>, BuildError> {
    let mut by_name: BTreeMap<String, Package> = BTreeMap::new();
    for package in packages {
        let Some(name) = &package.name else {
            continue;
        };
        if let Some(existing) = by_name.get(name) {
            return Err(BuildError::config(format!(
                "package name '{}' is used by both {} and {}",
                name,
                existing.root.display(),
                package.root.display()
            )));
        }
        by_name.insert(name.clone(), package.clone());
    }
    Ok(by_name)
}
