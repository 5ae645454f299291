//! Pipeline error taxonomy.
//!
//! Every error is fatal: the run stops at the first failing stage and
//! outputs of earlier stages stay on disk.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::process::{ProcessBuilder, ProcessOutput};

/// A failed bundle task inside the bundle stage.
#[derive(Debug)]
pub struct BundleFailure {
    pub target: String,
    pub error: BuildError,
}

/// Error raised by a pipeline stage.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The host triple could not be determined.
    #[error("could not determine the host target triple: {message}")]
    Resolution { message: String },

    /// An external tool could not be run or exited non-zero.
    #[error("`{tool}` {}", describe_exit(.code))]
    ExternalTool {
        tool: String,
        command: String,
        code: Option<i32>,
        /// The tool's diagnostic output
        output: String,
    },

    /// One or more bundle tasks failed.
    #[error("{} of {total} bundle task(s) failed: {}", .failures.len(), failed_targets(.failures))]
    BundleTask {
        total: usize,
        failures: Vec<BundleFailure>,
    },

    /// A directory could not be created or a file could not be read, written
    /// or copied.
    #[error("filesystem error at {}: {message}", .path.display())]
    FileSystem { path: PathBuf, message: String },

    /// A bundle does not honour its packaging strategy.
    #[error("bundle `{target}` violates its packaging strategy: {message}")]
    Packaging { target: String, message: String },

    /// The pipeline itself is misconfigured.
    #[error("{0}")]
    Config(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {}", code),
        None => "did not run to completion".to_string(),
    }
}

fn failed_targets(failures: &[BundleFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("`{}`", f.target))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BuildError {
    /// A tool that ran and exited unsuccessfully.
    pub fn tool_failed(cmd: &ProcessBuilder, output: &ProcessOutput) -> Self {
        let stderr = output.stderr_lossy();
        let output_text = if stderr.trim().is_empty() {
            output.stdout_lossy()
        } else {
            stderr
        };

        BuildError::ExternalTool {
            tool: cmd.program_name(),
            command: cmd.display_command(),
            code: output.code,
            output: output_text.trim_end().to_string(),
        }
    }

    /// A tool that could not be started at all.
    pub fn tool_unavailable(cmd: &ProcessBuilder, err: &anyhow::Error) -> Self {
        BuildError::ExternalTool {
            tool: cmd.program_name(),
            command: cmd.display_command(),
            code: None,
            output: format!("{:#}", err),
        }
    }

    pub fn fs(path: &Path, err: impl std::fmt::Display) -> Self {
        BuildError::FileSystem {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// A failing tool's own non-zero status is propagated; everything else
    /// exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::ExternalTool {
                code: Some(code), ..
            } if *code != 0 => *code,
            BuildError::BundleTask { failures, .. } => failures
                .first()
                .map(|f| f.error.exit_code())
                .unwrap_or(1),
            _ => 1,
        }
    }

    /// Convert to a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::Resolution { .. } => Diagnostic::error(self.to_string())
                .with_suggestion("Check that `rustc -vV` runs and prints a `host:` line")
                .with_suggestion(suggestions::INSTALL_TOOL),

            BuildError::ExternalTool {
                command,
                code,
                output,
                ..
            } => {
                let mut diag =
                    Diagnostic::error(self.to_string()).with_context(format!("command: {}", command));
                if !output.is_empty() {
                    diag = diag.with_context(output.clone());
                }
                if code.is_none() {
                    diag = diag.with_suggestion(suggestions::INSTALL_TOOL);
                }
                diag.with_suggestion(suggestions::RERUN)
                    .with_suggestion(suggestions::VERBOSE)
            }

            BuildError::BundleTask { failures, .. } => {
                let mut diag = Diagnostic::error(self.to_string());
                for failure in failures {
                    diag = diag.with_context(format!("[{}] {}", failure.target, failure.error));
                    if let BuildError::ExternalTool { output, .. } = &failure.error {
                        if !output.is_empty() {
                            diag = diag.with_context(output.clone());
                        }
                    }
                }
                diag.with_suggestion(suggestions::RERUN)
            }

            BuildError::FileSystem { path, .. } => Diagnostic::error(self.to_string())
                .with_location(path.clone())
                .with_suggestion(suggestions::RERUN),

            BuildError::Packaging { .. } => Diagnostic::error(self.to_string())
                .with_suggestion("Check the target's plugin list in Stagehand.toml")
                .with_suggestion("Set `check = false` on the target to skip this verification"),

            BuildError::Config(_) => Diagnostic::error(self.to_string()),
        }
    }
}
