//! Command implementations

use std::path::PathBuf;

use anyhow::Result;

use stagehand::core::Workspace;
use stagehand::util::{Config, GlobalContext};

pub mod build;
pub mod clean;
pub mod completions;
pub mod plan;
pub mod triple;

/// Flags shared by every subcommand.
pub struct GlobalArgs {
    pub verbose: bool,
    pub no_color: bool,
    pub manifest_path: Option<PathBuf>,
}

/// Locate and load the workspace along with its layered config.
pub fn load_workspace(args: &GlobalArgs) -> Result<(GlobalContext, Workspace, Config)> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(args.verbose);
    ctx.set_color(!args.no_color);

    let manifest_path = ctx.manifest_path(args.manifest_path.as_deref())?;
    let ws = Workspace::new(&manifest_path)?;
    let config = ctx.config(ws.root());

    Ok((ctx, ws, config))
}
