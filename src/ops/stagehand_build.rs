//! Implementation of `stagehand build`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::builder::events::{BuildEvent, EventSink};
use crate::builder::graph::{StageGraph, StageOutput, StageRun};
use crate::builder::report::BuildReport;
use crate::builder::{
    AssetCopier, BuildContext, BundlePipeline, HostTripleResolver, NativeBuilder, ShimEliminator,
    TypeVerifier,
};
use crate::core::{Profile, Workspace};
use crate::util::config::Config;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Package the binary module in release mode
    pub release: bool,

    /// Number of bundle tasks run at once
    pub jobs: Option<usize>,
}

/// Build context for a run: flags win over config, config over manifest.
pub fn build_context(ws: Workspace, config: &Config, opts: &BuildOptions, events: EventSink) -> BuildContext {
    let ws = ws.with_profile(Profile::from_release(opts.release));
    BuildContext::new(ws, &config.tools)
        .with_events(events)
        .with_jobs(opts.jobs.or(config.build.jobs))
}

/// The default stage chain for a workspace.
///
/// `postbuild` and `assets` are only present when the manifest configures
/// them.
pub fn pipeline_graph(ws: &Workspace) -> StageGraph {
    let manifest = ws.manifest();
    let mut graph = StageGraph::new();

    graph
        .add(HostTripleResolver::new(), &[])
        .add(NativeBuilder::new(), &["triple"])
        .add(BundlePipeline::new(), &["native"]);

    let mut last = "bundle";
    if manifest.postbuild.is_some() {
        graph.add(ShimEliminator::new(), &["bundle"]);
        last = "postbuild";
    }

    graph.add(TypeVerifier::new(), &[last]);

    if manifest.assets.is_some() {
        graph.add(AssetCopier::new(), &["typecheck"]);
    }

    graph
}

/// Result of a successful build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub run: StageRun,
    pub report: BuildReport,
    pub report_path: PathBuf,
    pub duration: Duration,
}

impl BuildOutcome {
    /// Number of bundle targets built.
    pub fn bundle_count(&self) -> usize {
        match self.run.output("bundle") {
            Some(StageOutput::Bundles(bundles)) => bundles.len(),
            _ => 0,
        }
    }
}

/// Build the workspace.
pub fn build(ctx: &BuildContext) -> Result<BuildOutcome> {
    let ws = ctx.workspace();
    let graph = pipeline_graph(ws);
    let stages: Vec<String> = graph.plan()?.into_iter().flatten().collect();

    tracing::debug!("pipeline: {}", stages.join(" -> "));
    ctx.events().emit(BuildEvent::BuildStarted {
        project: ws.manifest().project.name.clone(),
        profile: ctx.profile().to_string(),
        stages,
    });

    let start = Instant::now();
    let run = match graph.run(ctx) {
        Ok(run) => run,
        Err(err) => {
            ctx.events().emit(BuildEvent::BuildFinished {
                success: false,
                duration_ms: start.elapsed().as_millis() as u64,
                host_triple: None,
            });
            return Err(err.into());
        }
    };

    let report_path = ws.report_path();
    let report = BuildReport::collect(ws, &run)?;
    report.write(&report_path)?;
    tracing::debug!("wrote build report to {}", report_path.display());

    let duration = start.elapsed();
    ctx.events().emit(BuildEvent::BuildFinished {
        success: true,
        duration_ms: duration.as_millis() as u64,
        host_triple: report.host_triple.clone(),
    });

    let outcome = BuildOutcome {
        run,
        report,
        report_path,
        duration,
    };
    ctx.events().status(
        "Finished",
        format!(
            "{} bundle target(s) [{}] in {:.2}s",
            outcome.bundle_count(),
            ctx.profile(),
            duration.as_secs_f64()
        ),
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::builder::BuildError;
    use crate::core::manifest::MANIFEST_NAME;
    use crate::test_support::fixtures::{create_test_project, fake_toolchain, test_context, TRIPLE};
    use crate::test_support::{MockExecutor, MockProcessOutput};

    fn position(calls: &[String], prefix: &str) -> Option<usize> {
        calls.iter().position(|c| c.starts_with(prefix))
    }

    #[test]
    fn test_default_chain() {
        let (_tmp, ctx) = test_context();
        let plan = pipeline_graph(ctx.workspace()).plan().unwrap();

        let flat: Vec<String> = plan.into_iter().flatten().collect();
        assert_eq!(
            flat,
            vec!["triple", "native", "bundle", "postbuild", "typecheck", "assets"]
        );
    }

    #[test]
    fn test_optional_stages_are_omitted() {
        let manifest = crate::test_support::fixtures::viewer_manifest();
        let start = manifest.find("[postbuild]").unwrap();
        let tmp = create_test_project(&manifest[..start]);
        let ws = Workspace::new(&tmp.path().join(MANIFEST_NAME)).unwrap();

        assert_eq!(pipeline_graph(&ws).names(), vec!["triple", "native", "bundle", "typecheck"]);
        let graph = pipeline_graph(&ws);
        assert_eq!(graph.deps("typecheck").unwrap(), &["bundle".to_string()][..]);
    }

    #[test]
    fn test_successful_build_produces_every_output() {
        let (tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        fake_toolchain(&exec);
        let ctx = ctx.with_executor(Arc::new(exec.clone()));

        let outcome = build(&ctx).unwrap();
        let root = tmp.path();

        assert_eq!(outcome.bundle_count(), 3);
        assert!(root.join("docs/expressions.md").is_file());
        assert!(root.join("dist/esm/viewer.js").is_file());
        assert!(root.join("dist/esm/viewer.inline.js").is_file());
        assert!(root.join("dist/cdn/viewer.js").is_file());
        assert!(root.join("dist/css/pro.css").is_file());
        assert!(outcome.report_path.is_file());
        assert_eq!(outcome.report.host_triple.as_deref(), Some(TRIPLE));

        let calls = exec.calls();
        assert_eq!(calls[0], "rustc -vV");
        let tsc = position(&calls, "tsc").unwrap();
        let last_bundle = calls.iter().rposition(|c| c.starts_with("node")).unwrap();
        assert!(last_bundle < tsc);
        assert_eq!(calls.iter().filter(|c| c.starts_with("node")).count(), 4);

        let events = ctx.events().captured();
        assert!(matches!(events.first(), Some(BuildEvent::BuildStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(BuildEvent::BuildFinished { success: true, .. })
        ));
    }

    #[test]
    fn test_rebuild_is_identical() {
        let (_tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        fake_toolchain(&exec);
        let ctx = ctx.with_executor(Arc::new(exec));

        let first = build(&ctx).unwrap();
        let second = build(&ctx).unwrap();

        assert_eq!(first.report.files, second.report.files);
        assert_eq!(first.report.digest, second.report.digest);
    }

    #[test]
    fn test_native_failure_skips_bundling() {
        let (tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        exec.expect_prefix("cargo build", MockProcessOutput::failure(101, "error[E0308]"));
        fake_toolchain(&exec);
        let ctx = ctx.with_executor(Arc::new(exec.clone()));

        let err = build(&ctx).unwrap_err();

        let build_err = err.downcast_ref::<BuildError>().unwrap();
        assert_eq!(build_err.exit_code(), 101);
        assert!(!exec.was_called("node"));
        assert!(!tmp.path().join("dist/esm").exists());
        assert!(!ctx.workspace().report_path().exists());
        assert!(matches!(
            ctx.events().captured().last(),
            Some(BuildEvent::BuildFinished { success: false, .. })
        ));
    }

    #[test]
    fn test_one_bundle_failure_stops_later_stages() {
        let (tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        exec.expect_contains("\"name\":\"esm\"", MockProcessOutput::failure(3, "unresolved import"));
        fake_toolchain(&exec);
        let ctx = ctx.with_executor(Arc::new(exec.clone()));

        let err = build(&ctx).unwrap_err();

        let build_err = err.downcast_ref::<BuildError>().unwrap();
        assert!(matches!(build_err, BuildError::BundleTask { .. }));
        assert_eq!(build_err.exit_code(), 3);
        assert!(!exec.was_called("tsc"));
        assert_eq!(exec.calls().iter().filter(|c| c.starts_with("node")).count(), 3);
        assert!(!tmp.path().join("dist/css").exists());
    }

    #[test]
    fn test_failed_split_target_is_never_postbuilt() {
        let (tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        exec.expect_contains("\"name\":\"cdn\"", MockProcessOutput::failure(5, "chunk graph cycle"));
        fake_toolchain(&exec);
        let ctx = ctx.with_executor(Arc::new(exec.clone()));

        let err = build(&ctx).unwrap_err();

        let build_err = err.downcast_ref::<BuildError>().unwrap();
        assert!(matches!(build_err, BuildError::BundleTask { .. }));
        assert_eq!(build_err.exit_code(), 5);
        assert_eq!(exec.calls().iter().filter(|c| c.starts_with("node")).count(), 3);
        assert!(!exec.was_called("tsc"));
        let cdn_entry = tmp.path().join("dist/cdn/viewer.js");
        let folded = std::fs::read_to_string(&cdn_entry).unwrap_or_default();
        assert!(!folded.contains("shim folded"));
        assert!(tmp.path().join("dist/esm/viewer.js").exists());
    }

    #[test]
    fn test_jobs_limit_still_builds_everything() {
        let tmp = create_test_project(&crate::test_support::fixtures::viewer_manifest());
        let ws = Workspace::new(&tmp.path().join(MANIFEST_NAME)).unwrap();
        let exec = MockExecutor::new();
        fake_toolchain(&exec);
        let mut config = Config::default();
        config.build.jobs = Some(4);
        let opts = BuildOptions {
            release: true,
            jobs: Some(1),
        };
        let ctx = build_context(ws, &config, &opts, EventSink::quiet()).with_executor(Arc::new(exec.clone()));

        assert_eq!(ctx.jobs(), Some(1));
        assert_eq!(build(&ctx).unwrap().bundle_count(), 3);
        assert!(exec.calls().iter().any(|c| c.starts_with("wasm-pack") && c.ends_with("--release")));
    }
}
