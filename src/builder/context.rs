//! Build context - workspace, tools, executor and event sink for one run.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::builder::errors::BuildError;
use crate::builder::events::EventSink;
use crate::core::{Profile, Workspace};
use crate::util::config::ToolOverrides;
use crate::util::process::{Executor, ProcessBuilder, ProcessOutput, SystemExecutor};

/// External tool commands after config overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub rustc: String,
    pub cargo: String,
    /// Bundler driver: program followed by its fixed arguments
    pub bundler: Vec<String>,
    pub packager: String,
    pub typecheck: String,
}

impl Tools {
    /// Take tools from the manifest, replacing any that are overridden.
    pub fn resolve(ws: &Workspace, overrides: &ToolOverrides) -> Self {
        let manifest = ws.manifest();
        Tools {
            rustc: overrides
                .rustc
                .clone()
                .unwrap_or_else(|| manifest.tools.rustc.clone()),
            cargo: overrides
                .cargo
                .clone()
                .unwrap_or_else(|| manifest.tools.cargo.clone()),
            bundler: overrides
                .bundler
                .clone()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| manifest.tools.bundler.clone()),
            packager: overrides
                .packager
                .clone()
                .unwrap_or_else(|| manifest.native.packager.program.clone()),
            typecheck: overrides
                .typecheck
                .clone()
                .unwrap_or_else(|| manifest.typecheck.program.clone()),
        }
    }

    /// A process builder for the bundler driver, with its fixed arguments.
    pub fn bundler_command(&self) -> ProcessBuilder {
        let (program, args) = match self.bundler.split_first() {
            Some((program, args)) => (program.as_str(), args),
            None => ("node", &[][..]),
        };
        ProcessBuilder::new(program).args(args)
    }
}

/// Everything a stage needs to run.
#[derive(Clone)]
pub struct BuildContext {
    ws: Workspace,
    tools: Tools,
    executor: Arc<dyn Executor>,
    events: EventSink,
    jobs: Option<usize>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("root", &self.ws.root())
            .field("profile", &self.ws.profile())
            .field("tools", &self.tools)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl BuildContext {
    /// Create a context that runs real processes.
    pub fn new(ws: Workspace, overrides: &ToolOverrides) -> Self {
        let tools = Tools::resolve(&ws, overrides);
        BuildContext {
            ws,
            tools,
            executor: Arc::new(SystemExecutor),
            events: EventSink::default(),
            jobs: None,
        }
    }

    /// Replace the process executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Limit the number of concurrently running bundle tasks.
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs.filter(|j| *j > 0);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    pub fn root(&self) -> &Path {
        self.ws.root()
    }

    pub fn profile(&self) -> Profile {
        self.ws.profile()
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn jobs(&self) -> Option<usize> {
        self.jobs
    }

    /// Run a command from the project root and require it to succeed.
    ///
    /// Output is always captured; a non-zero exit becomes
    /// [`BuildError::ExternalTool`] carrying the tool's diagnostics.
    pub fn run(&self, cmd: ProcessBuilder) -> Result<ProcessOutput, BuildError> {
        let cmd = cmd.cwd(self.ws.root());
        tracing::debug!("running `{}`", cmd.display_command());

        let output = self
            .executor
            .exec(&cmd)
            .map_err(|e| BuildError::tool_unavailable(&cmd, &e))?;

        if !output.stderr.is_empty() {
            tracing::debug!("`{}` stderr:\n{}", cmd.program_name(), output.stderr_lossy().trim_end());
        }

        if !output.success() {
            return Err(BuildError::tool_failed(&cmd, &output));
        }
        Ok(output)
    }

    /// Run a command without checking its exit status.
    pub fn run_unchecked(&self, cmd: ProcessBuilder) -> anyhow::Result<ProcessOutput> {
        let cmd = cmd.cwd(self.ws.root());
        self.executor.exec(&cmd)
    }
}
