//! Host triple resolution.
//!
//! The native compiler's verbose version output (`rustc -vV`) carries a
//! `host: <triple>` line. The triple is resolved once and reused by every
//! native invocation of the run.

use std::sync::{LazyLock, OnceLock};

use regex::Regex;

use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::graph::{Stage, StageInputs, StageOutput};
use crate::core::HostTriple;
use crate::util::process::ProcessBuilder;

static HOST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|\s)host:[ \t]*(\S+)").unwrap());

/// Extract the host triple from compiler introspection output.
///
/// There is no fallback: output without a `host:` line is an error.
pub fn parse_host_triple(info: &str) -> Result<HostTriple, BuildError> {
    HOST_LINE
        .captures(info)
        .and_then(|caps| caps.get(1))
        .map(|m| HostTriple::new(m.as_str()))
        .ok_or_else(|| BuildError::Resolution {
            message: "compiler output has no `host:` line".to_string(),
        })
}

/// Resolves the host triple and caches it for the rest of the run.
#[derive(Debug, Default)]
pub struct HostTripleResolver {
    cache: OnceLock<HostTriple>,
}

impl HostTripleResolver {
    pub fn new() -> Self {
        HostTripleResolver {
            cache: OnceLock::new(),
        }
    }

    /// The resolved triple, if resolution already happened.
    pub fn cached(&self) -> Option<&HostTriple> {
        self.cache.get()
    }

    pub fn resolve(&self, ctx: &BuildContext) -> Result<HostTriple, BuildError> {
        if let Some(triple) = self.cache.get() {
            return Ok(triple.clone());
        }

        let rustc = &ctx.tools().rustc;
        let output = ctx
            .run_unchecked(ProcessBuilder::new(rustc).arg("-vV"))
            .map_err(|e| BuildError::Resolution {
                message: format!("failed to run `{} -vV`: {:#}", rustc, e),
            })?;

        if !output.success() {
            return Err(BuildError::Resolution {
                message: format!(
                    "`{} -vV` exited with status {}: {}",
                    rustc,
                    output
                        .code
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    output.stderr_lossy().trim()
                ),
            });
        }

        let triple = parse_host_triple(&output.stdout_lossy())?;
        tracing::debug!("resolved host triple {}", triple);

        Ok(self.cache.get_or_init(|| triple).clone())
    }
}

impl Stage for HostTripleResolver {
    fn name(&self) -> &str {
        "triple"
    }

    fn run(&self, ctx: &BuildContext, _inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError> {
        ctx.events().status("Resolving", "host target triple");
        self.resolve(ctx).map(StageOutput::Triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::test_context;
    use crate::test_support::{MockExecutor, MockProcessOutput};
    use std::sync::Arc;

    const RUSTC_VV: &str = "rustc 1.82.0 (f6e511eec 2024-10-15)\n\
        binary: rustc\n\
        commit-hash: f6e511eec7342f59a25f7c0534f1dbea00d01b14\n\
        host: x86_64-unknown-none-gnu\n\
        release: 1.82.0\n\
        LLVM version: 19.1.1\n";

    #[test]
    fn test_parse_host_line() {
        let triple = parse_host_triple(RUSTC_VV).unwrap();
        assert_eq!(triple.as_str(), "x86_64-unknown-none-gnu");
    }

    #[test]
    fn test_parse_without_host_line_fails() {
        let err = parse_host_triple("rustc 1.82.0\nrelease: 1.82.0\n").unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));

        // `host:` must be a whole token.
        assert!(parse_host_triple("target-host: x86_64-unknown-linux-gnu\n").is_err());
        assert!(parse_host_triple("host:\nrelease: 1.82.0\n").is_err());
    }

    #[test]
    fn test_parse_indented_and_inline_host() {
        let indented = parse_host_triple("rustc 1.82.0\n  host: x86_64-unknown-none-gnu\n").unwrap();
        assert_eq!(indented.as_str(), "x86_64-unknown-none-gnu");

        let inline = parse_host_triple("compiler info host: x86_64-unknown-none-gnu").unwrap();
        assert_eq!(inline.as_str(), "x86_64-unknown-none-gnu");

        let crlf = parse_host_triple("host: x86_64-pc-windows-msvc\r\nrelease: 1.82.0\r\n").unwrap();
        assert_eq!(crlf.as_str(), "x86_64-pc-windows-msvc");
    }

    #[test]
    fn test_resolve_caches_result() {
        let (_tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        exec.expect("rustc -vV", MockProcessOutput::success(RUSTC_VV));
        let ctx = ctx.with_executor(Arc::new(exec.clone()));

        let resolver = HostTripleResolver::new();
        let first = resolver.resolve(&ctx).unwrap();
        let second = resolver.resolve(&ctx).unwrap();

        assert_eq!(first, second);
        assert_eq!(resolver.cached(), Some(&first));
        assert_eq!(exec.calls(), vec!["rustc -vV"]);
    }

    #[test]
    fn test_missing_compiler_is_resolution_error() {
        let (_tmp, ctx) = test_context();
        let ctx = ctx.with_executor(Arc::new(MockExecutor::new()));

        let err = HostTripleResolver::new().resolve(&ctx).unwrap_err();
        assert!(matches!(err, BuildError::Resolution { .. }));
    }

    #[test]
    fn test_failing_compiler_is_resolution_error() {
        let (_tmp, ctx) = test_context();
        let exec = MockExecutor::new();
        exec.expect("rustc -vV", MockProcessOutput::failure(1, "toolchain not installed"));
        let ctx = ctx.with_executor(Arc::new(exec));

        let err = HostTripleResolver::new().resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("toolchain not installed"));
    }
}
