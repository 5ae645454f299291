//! Implementation of `stagehand clean`.
//!
//! Removes everything a build writes into the output tree: bundle outputs,
//! the packaged module directory, copied assets and the build report. The
//! documentation file and generated bindings live next to sources and are
//! left alone, as is the cargo target directory.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::target::OutputLocation;
use crate::core::Workspace;
use crate::util::fs::remove_path_if_exists;

/// Paths `clean` would remove, whether or not they exist.
pub fn clean_paths(ws: &Workspace) -> Vec<PathBuf> {
    let manifest = ws.manifest();
    let mut paths = Vec::new();

    for target in &manifest.targets {
        match &target.output {
            OutputLocation::Dir(dir) => paths.push(dir.clone()),
            OutputLocation::File(file) => {
                paths.push(file.clone());
                paths.push(PathBuf::from(format!("{}.map", file.display())));
            }
        }
    }
    paths.push(manifest.native.package_dir.clone());
    if let Some(ref assets) = manifest.assets {
        paths.push(assets.to.clone());
    }
    paths.push(ws.stagehand_dir());
    paths
}

/// Remove every build output. Returns the paths that existed.
pub fn clean(ws: &Workspace) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in clean_paths(ws) {
        if !path.exists() {
            continue;
        }
        remove_path_if_exists(&path)?;
        tracing::debug!("removed {}", path.display());
        removed.push(path);
    }
    Ok(removed)
}
