//! Artifact cache management.
//!
//! ## Commands
//!
//! - `relay cache path` - Print cache directory location
//! - `relay cache clean` - Remove every cached bundle

use anyhow::Result;
use colored::*;

use crate::config::Project;
use crate::toolchain::LocalArtifactCache;

#[derive(Clone, Debug)]
pub enum CacheOp {
    Path,
    Clean,
}

pub fn handle_cache(project: &Project, op: CacheOp) -> Result<()> {
    let cache = LocalArtifactCache::from_project(project)?;
    match op {
        CacheOp::Path => println!("{}", cache.root().display()),
        CacheOp::Clean => {
            println!("{} Cleaning cache...", "🧹".yellow());
            if cache.clean()? {
                println!("{} Cache cleaned.", "✓".green());
            } else {
                println!("{} Cache already empty.", "✓".green());
            }
        }
    }
    Ok(())
}
