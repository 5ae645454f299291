//! Pipeline stages and the graph runner that sequences them.
//!
//! Each stage wraps one external tool (or a file copy) behind the [`Stage`]
//! trait. [`StageGraph`] orders them by their declared dependencies.

pub mod assets;
pub mod bundle;
pub mod context;
pub mod errors;
pub mod events;
pub mod graph;
pub mod native;
pub mod postbuild;
pub mod progress;
pub mod report;
pub mod triple;
pub mod typecheck;

pub use assets::AssetCopier;
pub use bundle::{BundleJob, BundlePipeline, BundleResult};
pub use context::{BuildContext, Tools};
pub use errors::{BuildError, BundleFailure};
pub use events::{BuildEvent, EventSink, MessageFormat};
pub use graph::{Stage, StageGraph, StageInputs, StageOutput, StageRun};
pub use native::{ArtifactDescriptor, NativeBuilder};
pub use postbuild::ShimEliminator;
pub use report::BuildReport;
pub use triple::HostTripleResolver;
pub use typecheck::TypeVerifier;
