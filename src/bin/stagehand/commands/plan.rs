//! `stagehand plan` command

use anyhow::Result;

use super::{load_workspace, GlobalArgs};
use crate::cli::PlanArgs;
use stagehand::core::Profile;
use stagehand::ops::plan;

pub fn execute(global: &GlobalArgs, args: PlanArgs) -> Result<()> {
    let (_ctx, ws, _config) = load_workspace(global)?;
    let ws = ws.with_profile(Profile::from_release(args.release));

    let plan = plan(&ws)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    Ok(())
}
