//! Bundle pipeline.
//!
//! One task per configured target, run concurrently. Each task hands a
//! [`BundleJob`] to the bundler driver on stdin, collects the files it wrote
//! and optionally checks that they honour the target's packaging strategy.
//! The stage joins on every task before reporting; one failed task fails the
//! whole stage.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::builder::context::BuildContext;
use crate::builder::errors::{BuildError, BundleFailure};
use crate::builder::events::BuildEvent;
use crate::builder::graph::{Stage, StageInputs, StageOutput};
use crate::builder::progress::TaskProgress;
use crate::core::target::{BuildTarget, OutputFormat, OutputLocation, PackagingStrategy};
use crate::util::fs::list_files;

/// Number of leading module bytes that must not appear in an external bundle.
const RAW_PREFIX_LEN: usize = 64;

/// A single bundler invocation, serialized as JSON on the driver's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleJob {
    pub name: String,
    pub entry: PathBuf,
    pub format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outfile: Option<PathBuf>,
    /// Plugin names, in order
    pub plugins: Vec<String>,
    pub splitting: bool,
    /// Module patterns left unbundled
    pub external: Vec<String>,
    pub allow_overwrite: bool,
    /// The packaged binary module to inline or reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<PathBuf>,
    pub minify: bool,
}

impl BundleJob {
    pub fn for_target(target: &BuildTarget, module: &Path) -> Self {
        let (outdir, outfile) = match &target.output {
            OutputLocation::Dir(dir) => (Some(dir.clone()), None),
            OutputLocation::File(file) => (None, Some(file.clone())),
        };

        BundleJob {
            name: target.name.clone(),
            entry: target.entry.clone(),
            format: target.format,
            outdir,
            outfile,
            plugins: target.plugin_names(),
            splitting: target.splits(),
            external: target.external_modules(),
            allow_overwrite: false,
            module: Some(module.to_path_buf()),
            minify: target.minify,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, BuildError> {
        serde_json::to_vec(self)
            .map_err(|e| BuildError::Config(format!("failed to encode bundle job `{}`: {}", self.name, e)))
    }
}

/// Files written by one bundle target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleResult {
    pub target: String,
    pub strategy: PackagingStrategy,
    /// The target's main output file
    pub primary: PathBuf,
    /// Every file written, sorted
    pub files: Vec<PathBuf>,
}

impl BundleResult {
    pub fn event(&self) -> BuildEvent {
        BuildEvent::BundleArtifact {
            target: self.target.clone(),
            strategy: self.strategy.to_string(),
            filenames: self.files.clone(),
        }
    }
}

/// Run the bundler driver for one job.
pub fn run_bundler(ctx: &BuildContext, job: &BundleJob) -> Result<(), BuildError> {
    let cmd = ctx.tools().bundler_command().stdin(job.to_json()?);
    let output = ctx.run(cmd)?;

    let stdout = output.stdout_lossy();
    if !stdout.trim().is_empty() {
        tracing::debug!("bundler output for `{}`:\n{}", job.name, stdout.trim_end());
    }
    Ok(())
}

/// Files present at an output location after the bundler ran.
pub fn collect_outputs(output: &OutputLocation) -> Result<Vec<PathBuf>, BuildError> {
    match output {
        OutputLocation::File(file) => {
            let mut files = Vec::new();
            if file.is_file() {
                files.push(file.clone());
            }
            let map = PathBuf::from(format!("{}.map", file.display()));
            if map.is_file() {
                files.push(map);
            }
            Ok(files)
        }
        OutputLocation::Dir(dir) => list_files(dir).map_err(|e| BuildError::fs(dir, format!("{:#}", e))),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Check emitted files against a packaging strategy.
///
/// Source maps are ignored. Inline bundles must not mention the module's
/// extension at all; external bundles must reference it and must not carry
/// the module's leading bytes. Split bundles are not checked.
pub fn check_packaging(
    strategy: PackagingStrategy,
    files: &[PathBuf],
    module: &Path,
    extension: &str,
) -> Result<(), String> {
    if strategy == PackagingStrategy::Split {
        return Ok(());
    }

    let reference = format!(".{}", extension);
    let raw_prefix = match strategy {
        PackagingStrategy::External => {
            let bytes = std::fs::read(module)
                .map_err(|e| format!("cannot read module {}: {}", module.display(), e))?;
            bytes[..bytes.len().min(RAW_PREFIX_LEN)].to_vec()
        }
        _ => Vec::new(),
    };

    let mut referenced = false;
    for file in files {
        if file.extension().is_some_and(|ext| ext == "map") {
            continue;
        }
        let contents =
            std::fs::read(file).map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
        let mentions = contains(&contents, reference.as_bytes());

        match strategy {
            PackagingStrategy::Inline if mentions => {
                return Err(format!(
                    "{} references an external `{}` file",
                    file.display(),
                    reference
                ));
            }
            PackagingStrategy::External => {
                if !raw_prefix.is_empty() && contains(&contents, &raw_prefix) {
                    return Err(format!("{} embeds the binary module", file.display()));
                }
                referenced |= mentions;
            }
            _ => {}
        }
    }

    if strategy == PackagingStrategy::External && !referenced {
        return Err(format!("no output file references a `{}` module", reference));
    }
    Ok(())
}

/// Runs every configured bundle target.
#[derive(Debug, Default)]
pub struct BundlePipeline;

impl BundlePipeline {
    pub fn new() -> Self {
        BundlePipeline
    }

    /// Bundle every target against `module`, joining on all of them.
    ///
    /// Results keep the manifest's target order.
    pub fn run_all(&self, ctx: &BuildContext, module: &Path) -> Result<Vec<BundleResult>, BuildError> {
        let targets = &ctx.workspace().manifest().targets;
        ctx.events()
            .status("Bundling", format!("{} target(s)", targets.len()));

        let progress = if ctx.events().is_interactive() && !tracing::enabled!(tracing::Level::DEBUG) {
            TaskProgress::with_bar(targets.len())
        } else {
            TaskProgress::new(targets.len())
        };

        let run = || -> Vec<Result<BundleResult, BuildError>> {
            targets
                .par_iter()
                .map(|target| {
                    let result = self.run_task(ctx, target, module);
                    if let Err(err) = &result {
                        tracing::debug!("bundle `{}` failed: {}", target.name, err);
                    }
                    progress.task_done(&target.name, result.is_ok());
                    result
                })
                .collect()
        };

        let results = match ctx.jobs() {
            Some(jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .map_err(|e| BuildError::Config(format!("failed to start {} bundle workers: {}", jobs, e)))?
                .install(run),
            None => run(),
        };
        progress.finish();
        tracing::debug!(
            "{} of {} bundle task(s) succeeded, {} failed",
            progress.succeeded(),
            progress.total(),
            progress.failed()
        );

        let total = progress.total();
        let mut bundles = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(bundle) => {
                    ctx.events().emit(bundle.event());
                    bundles.push(bundle);
                }
                Err(error) => failures.push(BundleFailure {
                    target: target.name.clone(),
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            return Err(BuildError::BundleTask { total, failures });
        }
        Ok(bundles)
    }

    fn run_task(
        &self,
        ctx: &BuildContext,
        target: &BuildTarget,
        module: &Path,
    ) -> Result<BundleResult, BuildError> {
        let strategy = target
            .strategy()
            .map_err(|e| BuildError::Config(e.to_string()))?;

        run_bundler(ctx, &BundleJob::for_target(target, module))?;

        let files = collect_outputs(&target.output)?;
        if files.is_empty() {
            return Err(BuildError::fs(target.output.path(), "bundler wrote no files"));
        }

        if target.check {
            let extension = &ctx.workspace().manifest().native.module_extension;
            check_packaging(strategy, &files, module, extension).map_err(|message| {
                BuildError::Packaging {
                    target: target.name.clone(),
                    message,
                }
            })?;
        }

        tracing::debug!("bundle `{}` wrote {} file(s)", target.name, files.len());
        Ok(BundleResult {
            target: target.name.clone(),
            strategy,
            primary: target.primary_output(),
            files,
        })
    }
}

impl Stage for BundlePipeline {
    fn name(&self) -> &str {
        "bundle"
    }

    fn run(&self, ctx: &BuildContext, inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError> {
        let native = inputs.native()?;
        self.run_all(ctx, &native.module).map(StageOutput::Bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::test_support::fixtures::{fake_bundler, test_context, write_module};
    use crate::test_support::{MockExecutor, MockProcessOutput};

    #[test]
    fn test_job_for_split_target() {
        let (_tmp, ctx) = test_context();
        let cdn = ctx.workspace().manifest().target("cdn").unwrap();

        let job = BundleJob::for_target(cdn, Path::new("/p/dist/wasm/viewer_bg.wasm"));

        assert_eq!(job.name, "cdn");
        assert!(job.splitting);
        assert!(job.outfile.is_none());
        assert_eq!(job.plugins, vec!["binary-split"]);
        assert!(!job.allow_overwrite);

        let json: serde_json::Value = serde_json::from_slice(&job.to_json().unwrap()).unwrap();
        assert_eq!(json["format"], "esm");
        assert_eq!(json["module"], "/p/dist/wasm/viewer_bg.wasm");
        assert!(json.get("outfile").is_none());
    }

    #[test]
    fn test_all_targets_produce_output_sets() {
        let (tmp, ctx) = test_context();
        let module = write_module(tmp.path());
        let exec = MockExecutor::new();
        fake_bundler(&exec);
        let ctx = ctx.with_executor(Arc::new(exec.clone()));

        let bundles = BundlePipeline::new().run_all(&ctx, &module).unwrap();

        let names: Vec<&str> = bundles.iter().map(|b| b.target.as_str()).collect();
        assert_eq!(names, vec!["esm", "inline", "cdn"]);
        for bundle in &bundles {
            assert!(bundle.primary.is_file(), "{} missing", bundle.primary.display());
            assert!(bundle.files.contains(&bundle.primary));
        }
        assert_eq!(exec.calls().len(), 3);

        let artifacts = ctx
            .events()
            .captured()
            .into_iter()
            .filter(|e| matches!(e, BuildEvent::BundleArtifact { .. }))
            .count();
        assert_eq!(artifacts, 3);
    }

    #[test]
    fn test_one_failed_task_fails_the_stage() {
        let (tmp, ctx) = test_context();
        let module = write_module(tmp.path());
        let exec = MockExecutor::new();
        exec.expect_contains("\"name\":\"inline\"", MockProcessOutput::failure(2, "inline build broke"));
        fake_bundler(&exec);
        let ctx = ctx.with_executor(Arc::new(exec)).with_jobs(Some(2));

        let err = BundlePipeline::new().run_all(&ctx, &module).unwrap_err();

        match &err {
            BuildError::BundleTask { total, failures } => {
                assert_eq!(*total, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].target, "inline");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_check_inline_rejects_module_reference() {
        let tmp = tempfile::TempDir::new().unwrap();
        let module = write_module(tmp.path());
        let bundle = tmp.path().join("viewer.inline.js");

        std::fs::write(&bundle, "const bytes = \"AGFzbQEAAAA=\";").unwrap();
        assert!(check_packaging(PackagingStrategy::Inline, &[bundle.clone()], &module, "wasm").is_ok());

        std::fs::write(&bundle, "fetch(new URL(\"viewer_bg.wasm\", import.meta.url))").unwrap();
        let err = check_packaging(PackagingStrategy::Inline, &[bundle], &module, "wasm").unwrap_err();
        assert!(err.contains(".wasm"));
    }

    #[test]
    fn test_check_external_needs_reference_without_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let module = write_module(tmp.path());
        let bundle = tmp.path().join("viewer.js");
        let map = tmp.path().join("viewer.js.map");
        std::fs::write(&map, "{\"sources\":[\"viewer_bg.wasm\"]}").unwrap();

        std::fs::write(&bundle, "export default 1;").unwrap();
        let files = vec![bundle.clone(), map.clone()];
        assert!(check_packaging(PackagingStrategy::External, &files, &module, "wasm").is_err());

        std::fs::write(&bundle, "fetch(\"viewer_bg.wasm\")").unwrap();
        assert!(check_packaging(PackagingStrategy::External, &files, &module, "wasm").is_ok());

        let mut embedded = b"fetch(\"viewer_bg.wasm\");".to_vec();
        embedded.extend(std::fs::read(&module).unwrap());
        std::fs::write(&bundle, embedded).unwrap();
        let err = check_packaging(PackagingStrategy::External, &files, &module, "wasm").unwrap_err();
        assert!(err.contains("embeds"));
    }

    #[test]
    fn test_empty_output_is_an_error() {
        let (tmp, ctx) = test_context();
        let module = write_module(tmp.path());
        let exec = MockExecutor::new();
        exec.expect_prefix("node", MockProcessOutput::success(""));
        let ctx = ctx.with_executor(Arc::new(exec));

        let err = BundlePipeline::new().run_all(&ctx, &module).unwrap_err();
        match err {
            BuildError::BundleTask { failures, .. } => {
                assert_eq!(failures.len(), 3);
                assert!(failures[0].error.to_string().contains("wrote no files"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
