//! Implementation of `stagehand plan`.
//!
//! Describes what a build would do without running any tool.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::core::target::{OutputFormat, PackagingStrategy};
use crate::core::Workspace;
use crate::ops::stagehand_build::pipeline_graph;
use crate::util::fs::relative_path;

#[derive(Debug, Clone, Serialize)]
pub struct PlannedTarget {
    pub name: String,
    pub entry: PathBuf,
    pub format: OutputFormat,
    pub strategy: PackagingStrategy,
    pub plugins: Vec<String>,
    /// Output directory or file
    pub output: PathBuf,
    /// Main output file
    pub primary: PathBuf,
    pub splitting: bool,
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPostbuild {
    pub source: String,
    pub entry: PathBuf,
    pub external: Vec<String>,
}

/// A build plan. Paths are relative to the project root.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub project: String,
    pub profile: String,
    /// Stage names grouped into waves, in run order
    pub waves: Vec<Vec<String>>,
    pub targets: Vec<PlannedTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postbuild: Option<PlannedPostbuild>,
    pub report: PathBuf,
}

pub fn plan(ws: &Workspace) -> Result<BuildPlan> {
    let manifest = ws.manifest();
    let rel = |p: &std::path::Path| relative_path(ws.root(), p);

    let targets = manifest
        .targets
        .iter()
        .map(|t| -> Result<PlannedTarget> {
            Ok(PlannedTarget {
                name: t.name.clone(),
                entry: rel(&t.entry),
                format: t.format,
                strategy: t.strategy()?,
                plugins: t.plugin_names(),
                output: rel(t.output.path()),
                primary: rel(&t.primary_output()),
                splitting: t.splits(),
                external: t.external_modules(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let postbuild = manifest.postbuild.as_ref().and_then(|p| {
        manifest.target(&p.source).map(|source| PlannedPostbuild {
            source: p.source.clone(),
            entry: rel(&source.primary_output()),
            external: p.external.clone(),
        })
    });

    Ok(BuildPlan {
        project: manifest.project.name.clone(),
        profile: ws.profile().to_string(),
        waves: pipeline_graph(ws).plan()?,
        targets,
        postbuild,
        report: rel(&ws.report_path()),
    })
}
