//! `stagehand clean` command

use anyhow::Result;

use super::{load_workspace, GlobalArgs};
use crate::cli::CleanArgs;
use stagehand::ops::{clean, clean_paths};
use stagehand::util::fs::relative_path;

pub fn execute(global: &GlobalArgs, args: CleanArgs) -> Result<()> {
    let (_ctx, ws, _config) = load_workspace(global)?;

    if args.dry_run {
        for path in clean_paths(&ws).into_iter().filter(|p| p.exists()) {
            println!("{}", relative_path(ws.root(), &path).display());
        }
        return Ok(());
    }

    let removed = clean(&ws)?;
    eprintln!("{:>12} {} path(s)", "Removed", removed.len());

    Ok(())
}
