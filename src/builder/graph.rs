//! Stage graph runner.
//!
//! The pipeline is a set of named stages with declared dependencies. The
//! runner orders them topologically, groups them into waves (a stage runs one
//! wave after the last of its dependencies), runs each wave's stages
//! concurrently and joins before starting the next wave. The first failure
//! ends the run; no later wave starts.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use serde::Serialize;

use crate::builder::bundle::BundleResult;
use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::events::BuildEvent;
use crate::builder::native::ArtifactDescriptor;
use crate::core::HostTriple;

/// What a stage hands to the stages that depend on it.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Triple(HostTriple),
    Native(ArtifactDescriptor),
    Bundles(Vec<BundleResult>),
    Postbuild(BundleResult),
    /// A pass/fail gate with no artifact
    Checked,
    /// Files copied into place
    Copied(Vec<PathBuf>),
}

/// One step of the pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &BuildContext, inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError>;
}

/// Outputs of a stage's declared dependencies, in declaration order.
pub struct StageInputs<'a> {
    stage: &'a str,
    outputs: Vec<(&'a str, &'a StageOutput)>,
}

impl<'a> StageInputs<'a> {
    fn new(stage: &'a str, deps: &'a [String], done: &'a HashMap<String, StageOutput>) -> Self {
        let outputs = deps
            .iter()
            .filter_map(|dep| done.get(dep).map(|out| (dep.as_str(), out)))
            .collect();
        StageInputs { stage, outputs }
    }

    /// An empty input set, for stages without dependencies.
    pub fn empty(stage: &'a str) -> Self {
        StageInputs {
            stage,
            outputs: Vec::new(),
        }
    }

    /// Output of the named dependency.
    pub fn get(&self, name: &str) -> Option<&'a StageOutput> {
        self.outputs
            .iter()
            .find(|(dep, _)| *dep == name)
            .map(|(_, out)| *out)
    }

    fn find<T>(
        &self,
        what: &str,
        pick: impl Fn(&'a StageOutput) -> Option<T>,
    ) -> Result<T, BuildError> {
        self.outputs
            .iter()
            .find_map(|(_, out)| pick(out))
            .ok_or_else(|| {
                BuildError::Config(format!(
                    "stage `{}` needs {} but none of its dependencies provide it",
                    self.stage, what
                ))
            })
    }

    pub fn triple(&self) -> Result<&'a HostTriple, BuildError> {
        self.find("the host triple", |out| match out {
            StageOutput::Triple(t) => Some(t),
            _ => None,
        })
    }

    pub fn native(&self) -> Result<&'a ArtifactDescriptor, BuildError> {
        self.find("the native artifacts", |out| match out {
            StageOutput::Native(a) => Some(a),
            _ => None,
        })
    }

    pub fn bundles(&self) -> Result<&'a [BundleResult], BuildError> {
        self.find("bundle results", |out| match out {
            StageOutput::Bundles(b) => Some(b.as_slice()),
            _ => None,
        })
    }
}

struct StageNode {
    stage: Box<dyn Stage>,
    deps: Vec<String>,
}

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Result of a completed run.
#[derive(Debug, Default)]
pub struct StageRun {
    outputs: HashMap<String, StageOutput>,
    pub timings: Vec<StageTiming>,
}

impl StageRun {
    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.get(stage)
    }
}

/// A set of stages with declared dependencies.
#[derive(Default)]
pub struct StageGraph {
    nodes: Vec<StageNode>,
}

impl StageGraph {
    pub fn new() -> Self {
        StageGraph { nodes: Vec::new() }
    }

    /// Add a stage that runs after every stage named in `deps`.
    pub fn add(&mut self, stage: impl Stage + 'static, deps: &[&str]) -> &mut Self {
        self.nodes.push(StageNode {
            stage: Box::new(stage),
            deps: deps.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stage names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| n.stage.name().to_string())
            .collect()
    }

    /// Declared dependencies of a stage.
    pub fn deps(&self, stage: &str) -> Option<&[String]> {
        self.nodes
            .iter()
            .find(|n| n.stage.name() == stage)
            .map(|n| n.deps.as_slice())
    }

    /// Group stage indices into waves of mutually independent stages.
    fn waves(&self) -> Result<Vec<Vec<usize>>, BuildError> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut by_name: HashMap<&str, NodeIndex> = HashMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            let name = node.stage.name();
            if by_name.insert(name, graph.add_node(i)).is_some() {
                return Err(BuildError::Config(format!("duplicate stage `{}`", name)));
            }
        }

        for node in &self.nodes {
            let to = by_name[node.stage.name()];
            let mut seen = HashSet::new();
            for dep in &node.deps {
                let from = by_name.get(dep.as_str()).ok_or_else(|| {
                    BuildError::Config(format!(
                        "stage `{}` depends on unknown stage `{}`",
                        node.stage.name(),
                        dep
                    ))
                })?;
                if seen.insert(dep.as_str()) {
                    graph.add_edge(*from, to, ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            BuildError::Config(format!(
                "dependency cycle involving stage `{}`",
                self.nodes[graph[cycle.node_id()]].stage.name()
            ))
        })?;

        let mut level = vec![0usize; self.nodes.len()];
        for idx in order {
            let stage_level = graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .map(|dep| level[graph[dep]] + 1)
                .max()
                .unwrap_or(0);
            level[graph[idx]] = stage_level;
        }

        let depth = level.iter().copied().max().map_or(0, |m| m + 1);
        let mut waves = vec![Vec::new(); depth];
        for (i, l) in level.iter().enumerate() {
            waves[*l].push(i);
        }
        Ok(waves)
    }

    /// Stage names grouped by wave, for display.
    pub fn plan(&self) -> Result<Vec<Vec<String>>, BuildError> {
        Ok(self
            .waves()?
            .into_iter()
            .map(|wave| {
                wave.into_iter()
                    .map(|i| self.nodes[i].stage.name().to_string())
                    .collect()
            })
            .collect())
    }

    /// Run every stage, respecting dependencies.
    pub fn run(&self, ctx: &BuildContext) -> Result<StageRun, BuildError> {
        let waves = self.waves()?;
        let mut run = StageRun::default();

        for wave in waves {
            let results: Vec<(usize, Duration, Result<StageOutput, BuildError>)> = {
                let done = &run.outputs;
                let run_one = |i: &usize| {
                    let node = &self.nodes[*i];
                    let name = node.stage.name();
                    ctx.events().emit(BuildEvent::StageStarted {
                        stage: name.to_string(),
                    });
                    tracing::debug!("stage `{}` started", name);

                    let inputs = StageInputs::new(name, &node.deps, done);
                    let start = Instant::now();
                    let result = node.stage.run(ctx, &inputs);
                    (*i, start.elapsed(), result)
                };

                if wave.len() == 1 {
                    wave.iter().map(run_one).collect()
                } else {
                    wave.par_iter().map(run_one).collect()
                }
            };

            let mut first_error = None;
            for (i, duration, result) in results {
                let name = self.nodes[i].stage.name().to_string();
                ctx.events().emit(BuildEvent::StageFinished {
                    stage: name.clone(),
                    success: result.is_ok(),
                    duration_ms: duration.as_millis() as u64,
                });
                run.timings.push(StageTiming {
                    stage: name.clone(),
                    duration,
                });

                match result {
                    Ok(output) => {
                        tracing::debug!("stage `{}` finished in {:.2?}", name, duration);
                        run.outputs.insert(name, output);
                    }
                    Err(err) => {
                        tracing::debug!("stage `{}` failed: {}", name, err);
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }

            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(run)
    }
}
