//! Build report.
//!
//! Written to `<target-dir>/stagehand/build-report.json` after every
//! successful run. Each output file is listed with its SHA-256, and the
//! report carries one digest over all of them, so two runs over unchanged
//! inputs can be compared with a single string.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::graph::{StageOutput, StageRun, StageTiming};
use crate::core::Workspace;
use crate::util::fs::{relative_path, write_string};
use crate::util::hash::{sha256_file, Fingerprint};

/// One output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFile {
    /// Path relative to the project root
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

/// Per-stage timing as stored in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStage {
    pub stage: String,
    pub duration_ms: u64,
}

impl From<&StageTiming> for ReportStage {
    fn from(timing: &StageTiming) -> Self {
        ReportStage {
            stage: timing.stage.clone(),
            duration_ms: timing.duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_triple: Option<String>,
    pub profile: String,
    pub stages: Vec<ReportStage>,
    pub files: Vec<ReportFile>,
    /// Digest over every file's path and hash
    pub digest: String,
}

/// Every file a run produced, deduplicated and sorted.
pub fn produced_files(run: &StageRun) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for stage in ["native", "bundle", "postbuild", "assets"] {
        match run.output(stage) {
            Some(StageOutput::Native(artifacts)) => {
                files.push(artifacts.docs.clone());
                files.extend(artifacts.bindings.iter().cloned());
                files.push(artifacts.module.clone());
            }
            Some(StageOutput::Bundles(bundles)) => {
                files.extend(bundles.iter().flat_map(|b| b.files.iter().cloned()));
            }
            Some(StageOutput::Postbuild(bundle)) => files.extend(bundle.files.iter().cloned()),
            Some(StageOutput::Copied(copied)) => files.extend(copied.iter().cloned()),
            _ => {}
        }
    }
    files.sort();
    files.dedup();
    files
}

impl BuildReport {
    /// Hash every produced file.
    pub fn collect(ws: &Workspace, run: &StageRun) -> Result<Self> {
        let host_triple = match run.output("triple") {
            Some(StageOutput::Triple(triple)) => Some(triple.to_string()),
            _ => None,
        };

        let mut files = Vec::new();
        let mut fingerprint = Fingerprint::new();
        for path in produced_files(run) {
            // Copied asset directories are listed by their top-level path.
            if path.is_dir() {
                continue;
            }
            let sha256 = sha256_file(&path)?;
            let size = std::fs::metadata(&path)
                .with_context(|| format!("failed to stat {}", path.display()))?
                .len();
            let rel = relative_path(ws.root(), &path);

            fingerprint
                .update_str(&rel.to_string_lossy())
                .update_str(&sha256);
            files.push(ReportFile {
                path: rel,
                sha256,
                size,
            });
        }

        Ok(BuildReport {
            project: ws.manifest().project.name.clone(),
            host_triple,
            profile: ws.profile().to_string(),
            stages: run.timings.iter().map(ReportStage::from).collect(),
            files,
            digest: fingerprint.finish(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize build report")?;
        write_string(path, &format!("{}\n", json))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read build report: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid build report: {}", path.display()))
    }
}
