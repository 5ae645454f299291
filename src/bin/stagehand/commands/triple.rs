//! `stagehand triple` command

use anyhow::Result;

use super::{load_workspace, GlobalArgs};
use crate::cli::TripleArgs;
use stagehand::builder::{BuildContext, EventSink, HostTripleResolver};

pub fn execute(global: &GlobalArgs, _args: TripleArgs) -> Result<()> {
    let (_ctx, ws, config) = load_workspace(global)?;

    let ctx = BuildContext::new(ws, &config.tools).with_events(EventSink::quiet());
    let triple = HostTripleResolver::new().resolve(&ctx)?;
    println!("{}", triple);

    Ok(())
}
