//! Postbuild shim eliminator.
//!
//! The split target's bundle leaves a small module-loading shim in its own
//! chunk. This pass re-bundles the split target's entry file into the same
//! directory, keeping the binary module and worker/main-thread files
//! external so that only the shim is folded in.

use crate::builder::bundle::{collect_outputs, run_bundler, BundleJob, BundleResult};
use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::graph::{Stage, StageInputs, StageOutput};
use crate::core::target::OutputLocation;

#[derive(Debug, Default)]
pub struct ShimEliminator;

impl ShimEliminator {
    pub fn new() -> Self {
        ShimEliminator
    }

    /// Job that re-bundles `source`'s primary output in place.
    pub fn job(ctx: &BuildContext, source: &BundleResult) -> Result<BundleJob, BuildError> {
        let manifest = ctx.workspace().manifest();
        let postbuild = manifest
            .postbuild
            .as_ref()
            .ok_or_else(|| BuildError::Config("no [postbuild] section configured".to_string()))?;
        let target = manifest.target(&source.target).ok_or_else(|| {
            BuildError::Config(format!("unknown postbuild source `{}`", source.target))
        })?;

        let outdir = match &target.output {
            OutputLocation::Dir(dir) => dir.clone(),
            OutputLocation::File(_) => {
                return Err(BuildError::Config(format!(
                    "postbuild source `{}` must write to an outdir",
                    target.name
                )))
            }
        };

        Ok(BundleJob {
            name: format!("{}-postbuild", target.name),
            entry: source.primary.clone(),
            format: target.format,
            outdir: Some(outdir),
            outfile: None,
            plugins: Vec::new(),
            splitting: false,
            external: postbuild.external.clone(),
            allow_overwrite: true,
            module: None,
            minify: target.minify,
        })
    }

    pub fn run_pass(&self, ctx: &BuildContext, bundles: &[BundleResult]) -> Result<BundleResult, BuildError> {
        let source_name = ctx
            .workspace()
            .manifest()
            .postbuild
            .as_ref()
            .map(|p| p.source.as_str())
            .ok_or_else(|| BuildError::Config("no [postbuild] section configured".to_string()))?;

        // Only a successful split bundle gets here; a failed bundle stage
        // never hands its results on.
        let source = bundles
            .iter()
            .find(|b| b.target == source_name)
            .ok_or_else(|| {
                BuildError::Config(format!("no bundle result for postbuild source `{}`", source_name))
            })?;

        ctx.events()
            .status("Inlining", format!("runtime shim into {}", source.primary.display()));

        let job = Self::job(ctx, source)?;
        run_bundler(ctx, &job)?;

        if !source.primary.is_file() {
            return Err(BuildError::fs(&source.primary, "postbuild pass removed the entry file"));
        }

        let files = match &job.outdir {
            Some(dir) => collect_outputs(&OutputLocation::Dir(dir.clone()))?,
            None => vec![source.primary.clone()],
        };

        let result = BundleResult {
            target: source.target.clone(),
            strategy: source.strategy,
            primary: source.primary.clone(),
            files,
        };
        ctx.events().emit(result.event());
        Ok(result)
    }
}

impl Stage for ShimEliminator {
    fn name(&self) -> &str {
        "postbuild"
    }

    fn run(&self, ctx: &BuildContext, inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError> {
        let bundles = inputs.bundles()?;
        self.run_pass(ctx, bundles).map(StageOutput::Postbuild)
    }
}
