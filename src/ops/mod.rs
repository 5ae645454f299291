//! High-level operations.
//!
//! This module contains the implementation of Stagehand commands.

pub mod clean;
pub mod plan;
pub mod stagehand_build;

pub use clean::{clean, clean_paths};
pub use plan::{plan, BuildPlan};
pub use stagehand_build::{build, build_context, pipeline_graph, BuildOptions, BuildOutcome};
