//! Core data model: manifest, bundle targets, host triple and workspace.

pub mod manifest;
pub mod target;
pub mod triple;
pub mod workspace;

pub use manifest::{Manifest, ManifestError, MANIFEST_NAME};
pub use target::{BuildTarget, OutputFormat, OutputLocation, PackagingStrategy, Plugin};
pub use triple::HostTriple;
pub use workspace::{find_manifest, Profile, Workspace};
