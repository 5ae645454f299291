//! Static asset copy.

use std::path::PathBuf;

use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::graph::{Stage, StageInputs, StageOutput};
use crate::core::manifest::AssetsSection;
use crate::util::fs::copy_glob;

/// Copies the files matched by `[assets] from` into `[assets] to`.
///
/// Existing files are overwritten. A pattern that matches nothing is not an
/// error.
#[derive(Debug, Default)]
pub struct AssetCopier;

impl AssetCopier {
    pub fn new() -> Self {
        AssetCopier
    }

    pub fn copy(&self, ctx: &BuildContext, assets: &AssetsSection) -> Result<Vec<PathBuf>, BuildError> {
        let copied =
            copy_glob(&assets.from, &assets.to).map_err(|e| BuildError::fs(&assets.to, format!("{:#}", e)))?;

        if copied.is_empty() {
            tracing::warn!("no assets matched `{}`", assets.from);
        } else {
            ctx.events().status(
                "Copying",
                format!("{} asset(s) to {}", copied.len(), assets.to.display()),
            );
        }
        Ok(copied)
    }
}

impl Stage for AssetCopier {
    fn name(&self) -> &str {
        "assets"
    }

    fn run(&self, ctx: &BuildContext, _inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError> {
        let assets = ctx
            .workspace()
            .manifest()
            .assets
            .as_ref()
            .ok_or_else(|| BuildError::Config("no [assets] section configured".to_string()))?;
        self.copy(ctx, assets).map(StageOutput::Copied)
    }
}
