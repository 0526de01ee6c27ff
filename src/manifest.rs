//! Per-package manifest (`package.toml`).

use crate::error::BuildError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Manifest {
    pub name: Option<String>,
    pub dependencies: Vec<String>,
}

impl Manifest {
    pub fn parse(content: &str, origin: &Path) -> Result<Self, BuildError> {
        toml::from_str(content).map_err(|e| {
            BuildError::config(format!(
                "invalid manifest {}: {}",
                origin.display(),
                e.message()
            ))
        })
    }

    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let content = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::parse(&content, path)
    }
}
