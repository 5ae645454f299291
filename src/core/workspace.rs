//! Workspace - the project being built.
//!
//! A Workspace couples the loaded manifest with its root directory and the
//! build profile selected for this run.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::core::manifest::{Manifest, ManifestError, MANIFEST_NAME};

/// Optimization profile for the packaged binary module.
///
/// The metadata binary is an internal tool and is always built in debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Debug,
    Release,
}

impl Profile {
    pub fn from_release(release: bool) -> Self {
        if release {
            Profile::Release
        } else {
            Profile::Debug
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Debug => "debug",
            Profile::Release => "release",
        }
    }

    /// Flag understood by `wasm-pack build`.
    pub fn packager_flag(&self) -> &'static str {
        match self {
            Profile::Debug => "--dev",
            Profile::Release => "--release",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded project.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    manifest_path: PathBuf,
    manifest: Manifest,
    profile: Profile,
}

impl Workspace {
    /// Load a workspace from a manifest path.
    pub fn new(manifest_path: &Path) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        let root = manifest_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        Ok(Workspace {
            root,
            manifest_path: manifest_path.to_path_buf(),
            manifest,
            profile: Profile::Debug,
        })
    }

    /// Build a workspace from an already parsed manifest.
    pub fn from_manifest(root: impl Into<PathBuf>, manifest: Manifest) -> Self {
        let root = root.into();
        Workspace {
            manifest_path: root.join(MANIFEST_NAME),
            root,
            manifest,
            profile: Profile::Debug,
        }
    }

    /// Set the build profile.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Directory for stagehand's own bookkeeping files.
    pub fn stagehand_dir(&self) -> PathBuf {
        self.manifest.native.target_dir.join("stagehand")
    }

    /// Path of the build report written after a successful run.
    pub fn report_path(&self) -> PathBuf {
        self.stagehand_dir().join("build-report.json")
    }
}

/// Find the manifest by searching `start` and its ancestors.
pub fn find_manifest(start: &Path) -> Result<PathBuf, ManifestError> {
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ManifestError::NotFound(start.to_path_buf()))
}
