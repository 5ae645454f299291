//! Test utilities and mocks for Stagehand unit tests.
//!
//! [`MockExecutor`] stands in for every external tool the pipeline drives.
//! Expectations return canned output; handlers can also touch the file
//! system the way the real tool would, so stages that read their inputs
//! from disk can be tested end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use stagehand::test_support::{MockExecutor, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let exec = MockExecutor::new();
//!     exec.expect("rustc -vV", MockProcessOutput::success("host: x86_64-unknown-linux-gnu\n"));
//!
//!     // Hand `Arc::new(exec.clone())` to a BuildContext...
//! }
//! ```

pub mod fixtures;

use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::util::process::{Executor, ProcessBuilder, ProcessOutput};

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Create an output with both stdout and stderr.
    pub fn with_output(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

impl From<MockProcessOutput> for ProcessOutput {
    fn from(mock: MockProcessOutput) -> Self {
        ProcessOutput {
            code: Some(mock.status),
            stdout: mock.stdout.into_bytes(),
            stderr: mock.stderr.into_bytes(),
        }
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on the full command line.
    Exact(String),
    /// Match if the command line starts with a prefix.
    StartsWith(String),
    /// Match if the command line or its stdin contains a substring.
    Contains(String),
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str, stdin: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s) || stdin.contains(s),
        }
    }
}

type Handler = Arc<dyn Fn(&ProcessBuilder) -> MockProcessOutput + Send + Sync>;

#[derive(Clone)]
enum Response {
    Output(MockProcessOutput),
    Handler(Handler),
}

struct Expectation {
    pattern: CommandPattern,
    response: Response,
    times: Option<usize>,
    used: usize,
}

impl Expectation {
    fn available(&self) -> bool {
        self.times.map_or(true, |n| self.used < n)
    }
}

#[derive(Default)]
struct MockState {
    expectations: Vec<Expectation>,
    calls: Vec<String>,
}

/// Mock process executor for testing command execution.
///
/// Clones share expectations and the call log. Expectations are tried in
/// the order they were added; an unmatched command is an error, like a
/// missing tool.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockExecutor")
            .field("calls", &self.calls())
            .finish()
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        MockExecutor::default()
    }

    fn push(&self, pattern: CommandPattern, response: Response, times: Option<usize>) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.expectations.push(Expectation {
                pattern,
                response,
                times,
                used: 0,
            });
        }
        self
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.push(CommandPattern::Exact(cmd.to_string()), Response::Output(output), None)
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.push(
            CommandPattern::StartsWith(prefix.to_string()),
            Response::Output(output),
            None,
        )
    }

    /// Add an expectation for a command or stdin containing a substring.
    pub fn expect_contains(&self, substring: &str, output: MockProcessOutput) -> &Self {
        self.push(
            CommandPattern::Contains(substring.to_string()),
            Response::Output(output),
            None,
        )
    }

    /// Add an expectation that is used at most once.
    pub fn expect_once(&self, pattern: CommandPattern, output: MockProcessOutput) -> &Self {
        self.push(pattern, Response::Output(output), Some(1))
    }

    /// Run `handler` for commands starting with `prefix`.
    pub fn on_prefix<F>(&self, prefix: &str, handler: F) -> &Self
    where
        F: Fn(&ProcessBuilder) -> MockProcessOutput + Send + Sync + 'static,
    {
        self.push(
            CommandPattern::StartsWith(prefix.to_string()),
            Response::Handler(Arc::new(handler)),
            None,
        )
    }

    /// Run `handler` for commands whose line or stdin contains `substring`.
    pub fn on_contains<F>(&self, substring: &str, handler: F) -> &Self
    where
        F: Fn(&ProcessBuilder) -> MockProcessOutput + Send + Sync + 'static,
    {
        self.push(
            CommandPattern::Contains(substring.to_string()),
            Response::Handler(Arc::new(handler)),
            None,
        )
    }

    /// Every command line executed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Whether a command line starting with `prefix` was executed.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

impl Executor for MockExecutor {
    fn exec(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        let line = cmd.display_command();
        let stdin = cmd
            .get_stdin()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default();

        // The lock is released before a handler runs; handlers may be
        // called from several bundle tasks at once.
        let response = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(_) => bail!("mock executor state poisoned"),
            };
            state.calls.push(line.clone());
            state
                .expectations
                .iter_mut()
                .find(|e| e.available() && e.pattern.matches(&line, &stdin))
                .map(|e| {
                    e.used += 1;
                    e.response.clone()
                })
        };

        match response {
            Some(Response::Output(output)) => Ok(output.into()),
            Some(Response::Handler(handler)) => Ok(handler(cmd).into()),
            None => bail!("unexpected command: {}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_executor_first_match_wins() {
        let exec = MockExecutor::new();
        exec.expect_contains("--release", MockProcessOutput::failure(1, "no"));
        exec.expect_prefix("cargo", MockProcessOutput::success("ok"));

        let ok = exec.exec(&ProcessBuilder::new("cargo").arg("build")).unwrap();
        let failed = exec
            .exec(&ProcessBuilder::new("cargo").args(["build", "--release"]))
            .unwrap();

        assert!(ok.success());
        assert_eq!(failed.code, Some(1));
        assert_eq!(exec.calls(), vec!["cargo build", "cargo build --release"]);
    }

    #[test]
    fn test_mock_executor_matches_stdin() {
        let exec = MockExecutor::new();
        exec.expect_contains("\"name\":\"cdn\"", MockProcessOutput::success("matched"));

        let output = exec
            .exec(&ProcessBuilder::new("node").stdin(b"{\"name\":\"cdn\"}".to_vec()))
            .unwrap();
        assert_eq!(output.stdout_lossy(), "matched");
    }

    #[test]
    fn test_mock_executor_unexpected_command() {
        let exec = MockExecutor::new();
        let err = exec.exec(&ProcessBuilder::new("tsc")).unwrap_err();
        assert!(err.to_string().contains("unexpected command: tsc"));
        assert!(exec.was_called("tsc"));
    }

    #[test]
    fn test_mock_executor_expect_once() {
        let exec = MockExecutor::new();
        exec.expect_once(
            CommandPattern::Exact("tsc".to_string()),
            MockProcessOutput::success(""),
        );

        assert!(exec.exec(&ProcessBuilder::new("tsc")).is_ok());
        assert!(exec.exec(&ProcessBuilder::new("tsc")).is_err());
    }

    #[test]
    fn test_mock_executor_handler_sees_arguments() {
        let exec = MockExecutor::new();
        exec.on_prefix("meta", |cmd| {
            MockProcessOutput::success(cmd.get_args().join(","))
        });

        let output = exec
            .exec(&ProcessBuilder::new("meta").args(["--exports-dir", "out"]))
            .unwrap();
        assert_eq!(output.stdout_lossy(), "--exports-dir,out");
    }
}
