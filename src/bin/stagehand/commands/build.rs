//! `stagehand build` command

use anyhow::Result;

use super::{load_workspace, GlobalArgs};
use crate::cli::BuildArgs;
use stagehand::builder::{EventSink, MessageFormat};
use stagehand::ops::{build, build_context, BuildOptions};

pub fn execute(global: &GlobalArgs, args: BuildArgs) -> Result<()> {
    let (gctx, ws, config) = load_workspace(global)?;

    // Message format: CLI > config > human
    let format = match args.message_format {
        Some(ref f) => f.parse::<MessageFormat>().map_err(|e| anyhow::anyhow!(e))?,
        None => config.build.message_format.unwrap_or_default(),
    };

    let opts = BuildOptions {
        release: args.release,
        jobs: args.jobs,
    };

    let ctx = build_context(ws, &config, &opts, EventSink::new(format));
    let outcome = build(&ctx)?;

    if gctx.is_verbose() {
        ctx.events().status(
            "Report",
            format!("{} ({})", outcome.report_path.display(), &outcome.report.digest[..12]),
        );
    }

    Ok(())
}
