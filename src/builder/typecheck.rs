//! Static type check gate.
//!
//! Runs the configured type checker from the project root. The exit status
//! is the only signal; nothing it prints is used downstream.

use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::graph::{Stage, StageInputs, StageOutput};
use crate::util::process::ProcessBuilder;

#[derive(Debug, Default)]
pub struct TypeVerifier;

impl TypeVerifier {
    pub fn new() -> Self {
        TypeVerifier
    }

    pub fn command(ctx: &BuildContext) -> ProcessBuilder {
        ProcessBuilder::new(&ctx.tools().typecheck).args(&ctx.workspace().manifest().typecheck.args)
    }

    pub fn verify(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        ctx.events().status("Checking", "types");
        ctx.run(Self::command(ctx))?;
        Ok(())
    }
}

impl Stage for TypeVerifier {
    fn name(&self) -> &str {
        "typecheck"
    }

    fn run(&self, ctx: &BuildContext, _inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError> {
        self.verify(ctx).map(|()| StageOutput::Checked)
    }
}
