//! Stagehand - a staged build orchestrator for hybrid native + web components
//!
//! This crate provides the core library functionality for Stagehand: the
//! project manifest, the pipeline stages that drive the native toolchain,
//! the bundler and the type checker, and the graph runner that sequences
//! them.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for Stagehand unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a mock process executor and project fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildContext, BuildError};
pub use core::{manifest::Manifest, target::BuildTarget, workspace::Workspace};
pub use util::context::GlobalContext;
